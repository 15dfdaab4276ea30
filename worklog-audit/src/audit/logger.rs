//! Per-request audit logger
//!
//! `AuditLogger` buffers entries in memory for the lifetime of one request and
//! persists them as a single batch on [`AuditLogger::flush`]. Logging is
//! synchronous and never suspends, so sequence numbers follow the order in
//! which `log` calls actually run, including calls from concurrently polled
//! futures of the same request.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::context::{current_logger, RequestContext};
use super::event::{AuditLogEntry, NewAuditEntry};
use super::sanitize::Sanitizer;
use super::storage::AuditSink;
use crate::error::Result;
use crate::ids::EventId;

/// The identity entries are attributed to once authentication resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Profile identifier
    pub profile_id: String,
    /// Identity provider (e.g. `jira`, `gitlab`)
    pub provider: String,
}

/// Audit logger bound to one request
///
/// Cheap to clone; clones share the same buffer. Never shared across requests.
#[derive(Clone)]
pub struct AuditLogger {
    inner: Arc<Inner>,
}

struct Inner {
    context: Arc<RequestContext>,
    sink: Arc<dyn AuditSink>,
    sanitizer: Sanitizer,
    state: Mutex<LoggerState>,
}

#[derive(Default)]
struct LoggerState {
    buffer: Vec<AuditLogEntry>,
    next_sequence: u64,
    actor: Option<Actor>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("AuditLogger")
            .field("request_id", self.inner.context.request_id())
            .field("buffered", &state.buffer.len())
            .field("next_sequence", &state.next_sequence)
            .field("actor", &state.actor)
            .finish()
    }
}

impl AuditLogger {
    /// Create a logger for `context` that persists into `sink`
    pub fn new(context: Arc<RequestContext>, sink: Arc<dyn AuditSink>) -> Self {
        Self::with_sanitizer(context, sink, Sanitizer::default())
    }

    /// Create a logger with custom sanitization limits
    pub fn with_sanitizer(
        context: Arc<RequestContext>,
        sink: Arc<dyn AuditSink>,
        sanitizer: Sanitizer,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                sink,
                sanitizer,
                state: Mutex::new(LoggerState::default()),
            }),
        }
    }

    /// The context this logger is bound to
    pub fn context(&self) -> &Arc<RequestContext> {
        &self.inner.context
    }

    /// Append an entry to the buffer and return its id
    ///
    /// Merges in the correlation fields, the current actor, the next sequence
    /// number and the elapsed duration, and sanitizes free text and metadata.
    pub fn log(&self, entry: NewAuditEntry) -> EventId {
        let ctx = &self.inner.context;
        let sanitizer = &self.inner.sanitizer;

        let id = EventId::new();
        let mut record = AuditLogEntry {
            id: id.clone(),
            occurred_at: None,
            action_description: sanitizer.text(&entry.action_description),
            action_type: entry.action_type,
            target_resource_type: entry.target_resource_type,
            target_resource_id: entry.target_resource_id.map(|id| sanitizer.text(&id)),
            outcome: entry.outcome,
            severity: entry.severity,
            actor_profile_id: None,
            actor_provider: None,
            correlation_id: ctx.correlation_id().clone(),
            request_id: ctx.request_id().clone(),
            session_id: ctx.session_id().map(|s| sanitizer.text(s)),
            ip_address: sanitizer.ip_address(ctx.ip_address()),
            user_agent: sanitizer.user_agent(ctx.user_agent()),
            request_method: ctx.request_method().to_string(),
            request_path: sanitizer.text(ctx.request_path()),
            duration_ms: ctx.elapsed_ms(),
            sequence_number: 0,
            parent_event_id: entry.parent_event_id,
            metadata: entry.metadata.as_ref().map(|m| sanitizer.metadata(m)),
        };

        let mut state = self.state();
        record.sequence_number = state.next_sequence;
        state.next_sequence += 1;
        if let Some(actor) = &state.actor {
            record.actor_profile_id = Some(actor.profile_id.clone());
            record.actor_provider = Some(actor.provider.clone());
        }

        tracing::trace!(
            request_id = %ctx.request_id(),
            sequence = record.sequence_number,
            action = %record.action_type,
            "Audit entry buffered"
        );

        state.buffer.push(record);
        id
    }

    /// Attribute subsequent entries to `profile_id` at `provider`
    ///
    /// Entries already buffered keep the actor they were logged with.
    pub fn set_actor(&self, profile_id: impl Into<String>, provider: impl Into<String>) {
        let actor = Actor {
            profile_id: profile_id.into(),
            provider: provider.into(),
        };

        let mut state = self.state();
        if let Some(previous) = state.actor.as_ref().filter(|prev| **prev != actor) {
            tracing::debug!(
                request_id = %self.inner.context.request_id(),
                previous = %previous.profile_id,
                profile_id = %actor.profile_id,
                "Audit actor replaced"
            );
        }
        state.actor = Some(actor);
    }

    /// The actor currently attributed to new entries
    pub fn actor(&self) -> Option<Actor> {
        self.state().actor.clone()
    }

    /// Number of entries waiting to be flushed
    pub fn pending(&self) -> usize {
        self.state().buffer.len()
    }

    /// Snapshot of the buffered entries, in sequence order
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.state().buffer.clone()
    }

    /// Persist every buffered entry as one atomic batch, then empty the buffer
    ///
    /// Returns the number of entries written. An empty buffer performs no
    /// sink I/O. If the sink fails, the entries stay buffered (ahead of any
    /// logged during the attempt) and the error is returned to the caller.
    /// Dropping the returned future before the sink answers also leaves them
    /// buffered.
    pub async fn flush(&self) -> Result<usize> {
        let mut batch = std::mem::take(&mut self.state().buffer);
        if batch.is_empty() {
            return Ok(0);
        }

        let occurred_at = Utc::now();
        for entry in &mut batch {
            entry.occurred_at = Some(occurred_at);
        }

        // Until the sink confirms, the batch goes back to the buffer if the
        // write fails or this future is dropped mid-write
        let mut in_flight = InFlight {
            logger: self,
            batch,
        };
        self.inner.sink.write_batch(&in_flight.batch).await?;

        let written = std::mem::take(&mut in_flight.batch).len();
        tracing::debug!(
            request_id = %self.inner.context.request_id(),
            correlation_id = %self.inner.context.correlation_id(),
            entries = written,
            "Audit batch persisted"
        );
        Ok(written)
    }

    fn restore(&self, mut batch: Vec<AuditLogEntry>) {
        for entry in &mut batch {
            entry.occurred_at = None;
        }
        let mut state = self.state();
        let logged_meanwhile = std::mem::take(&mut state.buffer);
        batch.extend(logged_meanwhile);
        state.buffer = batch;
    }

    /// Discard every buffered entry without persisting; returns how many were dropped
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut self.state().buffer).len();
        if dropped > 0 {
            tracing::trace!(
                request_id = %self.inner.context.request_id(),
                dropped,
                "Audit buffer cleared"
            );
        }
        dropped
    }

    fn state(&self) -> MutexGuard<'_, LoggerState> {
        // The state has no invariants a panicking `log` could break mid-update
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct InFlight<'a> {
    logger: &'a AuditLogger,
    batch: Vec<AuditLogEntry>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.batch.is_empty() {
            self.logger.restore(std::mem::take(&mut self.batch));
        }
    }
}

/// Log through the current request's logger
///
/// Returns `None` and does nothing when no audit scope is active.
pub fn log(entry: NewAuditEntry) -> Option<EventId> {
    current_logger().map(|logger| logger.log(entry))
}

/// Set the actor on the current request's logger; returns whether one was active
pub fn set_actor(profile_id: impl Into<String>, provider: impl Into<String>) -> bool {
    match current_logger() {
        Some(logger) => {
            logger.set_actor(profile_id, provider);
            true
        }
        None => false,
    }
}
