//! Tracing audit sink
//!
//! Emits each entry as a structured event on the `audit` target, so the trail
//! ends up wherever the tracing subscriber ships logs. A batch is written in
//! one pass without suspension, which is as atomic as a log stream gets.

use async_trait::async_trait;

use super::AuditSink;
use crate::audit::event::{AuditLogEntry, AuditSeverity};
use crate::error::Result;

/// Audit sink backed by `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a tracing sink
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingSink {
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        // Serialize everything up front so a bad entry fails the whole batch
        let metadata = entries
            .iter()
            .map(|e| e.metadata.as_ref().map(serde_json::to_string).transpose())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (entry, metadata) in entries.iter().zip(metadata) {
            macro_rules! emit {
                ($level:ident) => {
                    tracing::$level!(
                        target: "audit",
                        id = %entry.id,
                        occurred_at = ?entry.occurred_at,
                        action_type = %entry.action_type,
                        target_resource_type = %entry.target_resource_type,
                        target_resource_id = entry.target_resource_id.as_deref(),
                        outcome = %entry.outcome,
                        severity = %entry.severity,
                        actor_profile_id = entry.actor_profile_id.as_deref(),
                        actor_provider = entry.actor_provider.as_deref(),
                        correlation_id = %entry.correlation_id,
                        request_id = %entry.request_id,
                        session_id = entry.session_id.as_deref(),
                        ip_address = entry.ip_address.as_deref(),
                        user_agent = entry.user_agent.as_deref(),
                        method = %entry.request_method,
                        path = %entry.request_path,
                        duration_ms = entry.duration_ms,
                        sequence = entry.sequence_number,
                        parent_event_id = entry.parent_event_id.as_ref().map(|p| p.as_str()),
                        metadata = metadata.as_deref(),
                        "{}",
                        entry.action_description
                    )
                };
            }

            match entry.severity {
                AuditSeverity::Debug => emit!(debug),
                AuditSeverity::Info => emit!(info),
                AuditSeverity::Warning => emit!(warn),
                AuditSeverity::Error | AuditSeverity::Critical => emit!(error),
            }
        }

        Ok(())
    }
}
