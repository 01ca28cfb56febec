//! Page storage: the `ItemStore` contract and its backends.
//!
//! - `repo`: SQLite backend on top of `sqlx`.
//! - `files`: one JSON file per page under `<root>/<owner>/<hash>`.
//! - `model`: the record persisted by the file backend.
//!
//! Stores address pages by [`Item::hash`] but do not enforce uniqueness; callers
//! check [`ItemStore::exists`] before [`ItemStore::save`].

pub mod files;
pub mod model;
pub mod repo;

use crate::model::Item;
use async_trait::async_trait;
use thiserror::Error;

pub use files::FileStore;
pub use repo::{init_pool, run_migrations, Pool, SqliteStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt page record: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn save(&self, item: &Item) -> Result<(), StorageError>;

    async fn exists(&self, item: &Item) -> Result<bool, StorageError>;

    /// A uniformly random page of `owner`, or `None` when nothing is saved.
    async fn pick_random(&self, owner: &str) -> Result<Option<Item>, StorageError>;

    async fn remove(&self, item: &Item) -> Result<(), StorageError>;
}
