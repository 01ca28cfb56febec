//! Per-conversation state: a small key→string cache.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStateStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStateStore;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no state for key {0}")]
    NotFound(String),
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<String, StateError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError>;

    async fn delete(&self, key: &str) -> Result<(), StateError>;
}
