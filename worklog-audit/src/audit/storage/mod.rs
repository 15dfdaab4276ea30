//! Audit sink trait and backend implementations
//!
//! The `AuditSink` trait is the single write path of the audit trail. A flush
//! hands the sink every buffered entry of one request at once, and the sink
//! must store the batch atomically: either every entry is persisted or none is.
//!
//! # Available Backends
//!
//! - **Memory**: in-process, inspectable; for development and tests
//! - **Tracing**: one structured `tracing` event per entry on the `audit` target
//! - **PostgreSQL** (`database` feature): one transaction per batch

use async_trait::async_trait;
use std::sync::Arc;

use super::event::AuditLogEntry;
use crate::config::{Config, SinkKind};
use crate::error::{Error, Result};

pub mod memory;
pub mod tracing_sink;

#[cfg(feature = "database")]
pub mod pg;

pub use memory::MemorySink;
pub use tracing_sink::TracingSink;

#[cfg(feature = "database")]
pub use pg::PgAuditSink;

/// Trait for audit persistence backends
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a batch of entries as a single atomic operation
    ///
    /// Called with a non-empty batch in sequence order. On error nothing from
    /// the batch may have been stored.
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<()>;
}

#[async_trait]
impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        (**self).write_batch(entries).await
    }
}

/// Build the sink selected by `config.audit.sink`
///
/// The Postgres sink connects and creates its table; it requires the
/// `database` feature and a `[database]` section.
pub async fn from_config(config: &Config) -> Result<Arc<dyn AuditSink>> {
    match config.audit.sink {
        SinkKind::Memory => Ok(Arc::new(MemorySink::new())),
        SinkKind::Tracing => Ok(Arc::new(TracingSink::new())),
        #[cfg(feature = "database")]
        SinkKind::Postgres => {
            let db = config.database.as_ref().ok_or_else(|| {
                Error::Internal("audit sink 'postgres' requires a [database] section".to_string())
            })?;
            let sink = PgAuditSink::connect(db).await?;
            sink.initialize().await?;
            Ok(Arc::new(sink))
        }
        #[cfg(not(feature = "database"))]
        SinkKind::Postgres => Err(Error::Internal(
            "audit sink 'postgres' requires the `database` feature".to_string(),
        )),
    }
}
