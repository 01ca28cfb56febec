use super::{ItemStore, StorageError};
use crate::model::Item;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, StorageError> {
    let normalized = prepare_sqlite_url(database_url);
    // Enable WAL and stricter durability.
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    // Every connection to `sqlite::memory:` opens a separate database.
    let max_connections = if normalized.starts_with("sqlite::memory") {
        1
    } else {
        8
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Pages table keyed by the content hash of (url, owner).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, owner: &str) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pages WHERE owner = ?")
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    #[instrument(skip_all)]
    async fn save(&self, item: &Item) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO pages (hash, url, owner) VALUES (?, ?, ?)")
            .bind(item.hash())
            .bind(&item.url)
            .bind(&item.owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn exists(&self, item: &Item) -> Result<bool, StorageError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pages WHERE hash = ?")
            .bind(item.hash())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    #[instrument(skip_all)]
    async fn pick_random(&self, owner: &str) -> Result<Option<Item>, StorageError> {
        let url: Option<String> =
            sqlx::query_scalar("SELECT url FROM pages WHERE owner = ? ORDER BY RANDOM() LIMIT 1")
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?;
        Ok(url.map(|url| Item::new(url, owner)))
    }

    #[instrument(skip_all)]
    async fn remove(&self, item: &Item) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM pages WHERE hash = ?")
            .bind(item.hash())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_untouched() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("sqlite::memory:?cache=shared"),
            "sqlite::memory:?cache=shared"
        );
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn file_urls_normalized_and_parent_created() {
        let td = tempfile::tempdir().unwrap();
        let db = td.path().join("nested").join("pages.db");
        let url = format!("sqlite:{}?mode=rwc", db.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, format!("sqlite://{}?mode=rwc", db.display()));
        assert!(db.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let td = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/data/pages.db", td.path().display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        store.save(&Item::new("https://a.example", "alice")).await.unwrap();
        assert_eq!(store.count("alice").await.unwrap(), 1);
        assert!(td.path().join("data").join("pages.db").exists());
    }
}
