//! Authoritative data store: the read contract the cache-aside path
//! depends on, its backends, and the department aggregation.
//!
//! Records are opaque JSON documents; nothing in this module assigns them a
//! schema except [`aggregate::average_marks_by_department`], which reads two
//! well-known fields.

use async_trait::async_trait;
use thiserror::Error;

pub mod aggregate;
mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// One stored document.
pub type Record = serde_json::Value;

/// Errors from a store query.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at all.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// The store was reached but the query failed.
    #[error("query on collection `{collection}` failed: {message}")]
    Query { collection: String, message: String },
}

/// Read access to named collections of records.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns every record in `collection`, in store order. A collection
    /// that does not exist is empty.
    async fn query_all(&self, collection: &str) -> Result<Vec<Record>, StoreError>;
}
