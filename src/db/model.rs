//! Records persisted by the storage backends.

use crate::model::Item;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk form of a saved page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPage {
    pub url: String,
    pub owner: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredPage {
    pub fn from_item(item: &Item) -> Self {
        Self {
            url: item.url.clone(),
            owner: item.owner.clone(),
            saved_at: Utc::now(),
        }
    }

    pub fn into_item(self) -> Item {
        Item {
            url: self.url,
            owner: self.owner,
        }
    }
}
