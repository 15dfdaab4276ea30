//! In-memory audit sink
//!
//! Keeps every persisted entry in a vector. Useful in development and as the
//! sink under test; writes can be switched to fail to exercise the flush error
//! path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::AuditSink;
use crate::audit::event::AuditLogEntry;
use crate::error::{Error, Result, SinkOperation};

/// In-process audit sink
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AuditLogEntry>>,
    batches: AtomicUsize,
    fail: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every entry written so far, in write order
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful batch writes
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::sink(
                SinkOperation::Insert,
                "memory sink is configured to fail",
            ));
        }

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(entries);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
