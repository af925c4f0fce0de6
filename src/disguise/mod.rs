mod disguised_stream;
mod header_disguise;

pub use disguised_stream::DisguisedStream;
pub use header_disguise::{HeaderDisguise, MAX_HEADER_SIZE};
