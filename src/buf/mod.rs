//! Segmented buffers: pooled fixed-size segments and the chains built on
//! them.

mod multi_buffer;
mod multi_buffer_container;
mod segment;
mod segment_pool;

pub use multi_buffer::{MultiBuffer, PartialRead};
pub use multi_buffer_container::MultiBufferContainer;
pub use segment::{Segment, SEGMENT_SIZE};
pub use segment_pool::{SegmentPool, DEFAULT_MAX_IDLE_SEGMENTS};
