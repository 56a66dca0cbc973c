//! Optional persistence port for finished run records.
//!
//! The core only guarantees that `RunRecord` serializes cleanly; any
//! durable storage lives behind this trait in the application.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::record::RunRecord;

/// Accepts a finished run record for durable storage.
#[async_trait]
pub trait RunSink: Send + Sync {
    /// Store one finalized record.
    async fn store(&self, record: &RunRecord) -> Result<()>;
}
