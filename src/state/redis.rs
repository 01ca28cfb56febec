use super::{StateError, StateStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

/// Redis-backed state store. Keys never expire; TTL policy belongs to the server.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore").finish_non_exhaustive()
    }
}

impl RedisStateStore {
    /// Connects eagerly so a bad URL fails at startup rather than on the first callback.
    pub async fn connect(url: &str) -> Result<Self, StateError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<String, StateError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        value.ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
