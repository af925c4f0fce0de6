use std::fmt::Debug;

use crate::error::Result;

pub trait ShadowsocksKey: Send + Sync + Debug {
    fn master_key(&self) -> &[u8];

    fn create_session_key(&self, salt: &[u8]) -> Result<Box<[u8]>>;
}
