//! Store backed by one JSON array file per collection.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{Record, Store, StoreError};

/// Reads `<root>/<collection>.json`, which must hold a JSON array.
///
/// - `root` missing or not a directory → [`StoreError::Unavailable`]
/// - collection file missing → empty collection
/// - file not a JSON array, or an unsafe collection name → [`StoreError::Query`]
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Query {
                collection: collection.to_owned(),
                message: "collection names may only contain letters, digits, `_` and `-`"
                    .to_owned(),
            });
        }
        Ok(self.root.join(format!("{collection}.json")))
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn query_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let path = self.collection_path(collection)?;

        let root_is_dir = tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !root_is_dir {
            return Err(StoreError::Unavailable {
                message: format!("data directory {} is not accessible", self.root.display()),
            });
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(collection = %collection, "collection file absent, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::Unavailable {
                    message: format!("reading {}: {e}", path.display()),
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Query {
            collection: collection.to_owned(),
            message: format!("{} is not a JSON array of documents: {e}", path.display()),
        })
    }
}
