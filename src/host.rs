//! Document-editing host collaborator
//!
//! The engine never inspects the host's document model; it hands over a
//! validated operation result and a target location descriptor and gets back
//! success or failure.

use crate::error::Result;
use crate::models::{DocumentContext, OperationResult};
use tracing::info;

#[async_trait::async_trait]
pub trait DocumentHost: Send + Sync {
    /// Apply one operation at the given target location.
    async fn apply(&self, operation: &OperationResult, target: &DocumentContext) -> Result<()>;
}

/// Host stand-in that accepts every operation. Used when the engine runs
/// without a connected editor.
pub struct LoggingDocumentHost;

#[async_trait::async_trait]
impl DocumentHost for LoggingDocumentHost {
    async fn apply(&self, operation: &OperationResult, _target: &DocumentContext) -> Result<()> {
        info!(intent = %operation.intent(), "Host apply (no editor connected)");
        Ok(())
    }
}
