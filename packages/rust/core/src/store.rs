//! Persistence seam for the pipeline.

use async_trait::async_trait;

use toolharvest_shared::{EnrichedRecord, Result};
use toolharvest_storage::Storage;

/// Keyed existence check and keyed upsert.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn exists(&self, data_id: &str) -> Result<bool>;

    /// Insert or replace the record stored under its `data_id`.
    async fn upsert(&self, record: &EnrichedRecord) -> Result<()>;
}

#[async_trait]
impl RecordStore for Storage {
    async fn exists(&self, data_id: &str) -> Result<bool> {
        self.tool_exists(data_id).await
    }

    async fn upsert(&self, record: &EnrichedRecord) -> Result<()> {
        self.upsert_tool(record).await
    }
}
