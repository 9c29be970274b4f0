//! 📜 The listing cache. One full listing per prefix per run, shared read-only.
//!
//! Thirty yearly jobs over the same folder would otherwise page through the same
//! million keys thirty times. Instead the first job to ask does the listing and
//! everybody else waits on the same `OnceCell` and gets the same `Arc<[String]>`.
//! A failed listing leaves the cell empty, so the next job to ask tries again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::info;

use crate::backends::{ObjectStore, StoreBackend};
use crate::errors::ArchiveError;

pub(crate) type Listing = Arc<[String]>;

#[derive(Debug)]
pub(crate) struct ListingCache {
    store: Arc<StoreBackend>,
    cells: Mutex<HashMap<String, Arc<OnceCell<Listing>>>>,
}

impl ListingCache {
    pub(crate) fn new(store: Arc<StoreBackend>) -> Self {
        Self {
            store,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// 🗂️ Every key under `prefix`, listed at most once no matter how many jobs ask.
    pub(crate) async fn keys(&self, prefix: &str) -> Result<Listing, ArchiveError> {
        let the_cell = {
            let mut cells = self
                .cells
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cells.entry(prefix.to_string()).or_default().clone()
        };

        the_cell
            .get_or_try_init(|| async {
                let the_keys = self.store.list(prefix).await.map_err(|source| {
                    ArchiveError::ListFailure {
                        prefix: prefix.to_string(),
                        source,
                    }
                })?;
                info!("📜 listed {} keys under '{}'", the_keys.len(), prefix);
                Ok::<_, ArchiveError>(Listing::from(the_keys))
            })
            .await
            .cloned()
    }
}

/// 📁 `folder` as a listing prefix: exactly one trailing slash, or empty for the bucket root.
pub(crate) fn folder_prefix(folder: &str) -> String {
    let the_folder = folder.trim_matches('/');
    if the_folder.is_empty() {
        String::new()
    } else {
        format!("{the_folder}/")
    }
}
