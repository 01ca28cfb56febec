use super::model::StoredPage;
use super::{ItemStore, StorageError};
use crate::model::Item;
use async_trait::async_trait;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Directory-per-owner page store: `<root>/<owner>/<hash>` holds one JSON record.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn owner_dir(&self, owner: &str) -> PathBuf {
        self.root.join(owner)
    }

    fn page_path(&self, item: &Item) -> PathBuf {
        self.owner_dir(&item.owner).join(item.hash())
    }

    async fn decode(path: &Path) -> Result<Item, StorageError> {
        let bytes = fs::read(path).await?;
        let page: StoredPage = serde_json::from_slice(&bytes)?;
        Ok(page.into_item())
    }
}

#[async_trait]
impl ItemStore for FileStore {
    #[instrument(skip_all)]
    async fn save(&self, item: &Item) -> Result<(), StorageError> {
        fs::create_dir_all(self.owner_dir(&item.owner)).await?;
        let bytes = serde_json::to_vec(&StoredPage::from_item(item))?;
        fs::write(self.page_path(item), bytes).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn exists(&self, item: &Item) -> Result<bool, StorageError> {
        match fs::metadata(self.page_path(item)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip_all)]
    async fn pick_random(&self, owner: &str) -> Result<Option<Item>, StorageError> {
        let mut entries = match fs::read_dir(self.owner_dir(owner)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        if paths.is_empty() {
            return Ok(None);
        }

        let idx = rand::thread_rng().gen_range(0..paths.len());
        Self::decode(&paths[idx]).await.map(Some)
    }

    #[instrument(skip_all)]
    async fn remove(&self, item: &Item) -> Result<(), StorageError> {
        fs::remove_file(self.page_path(item)).await?;
        Ok(())
    }
}
