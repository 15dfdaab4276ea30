//! Request-scoped audit trail
//!
//! Every inbound request gets a [`RequestContext`] (correlation id, request
//! id, session, client details) and an [`AuditLogger`] that buffers entries in
//! memory. Both are published in task-local slots for the duration of the
//! handler, so business code records events with a single call:
//!
//! ```rust,ignore
//! use worklog_audit::audit::{self, catalog};
//!
//! async fn link_account(profile: &Profile, account: &Account) -> Result<()> {
//!     repo.link(profile, account).await?;
//!     audit::set_actor(&profile.id, &account.provider);
//!     audit::log(catalog::account_linked(&profile.id, &account.provider, &account.id));
//!     Ok(())
//! }
//! ```
//!
//! When the handler settles, [`AuditMiddleware`] flushes the buffer to the
//! configured [`AuditSink`] as one atomic batch and clears it. Outside a
//! request (or with auditing disabled) the ambient functions are no-ops.
//!
//! # Modules
//!
//! - [`sanitize`]: control-character stripping, truncation, secret redaction, IP masking
//! - [`context`]: request context and task-local propagation
//! - [`event`]: entry types
//! - [`logger`]: the per-request buffer
//! - [`middleware`]: scope lifecycle and axum integration
//! - [`catalog`]: factory functions for business events
//! - [`storage`]: sink trait and backends

pub mod catalog;
pub mod context;
pub mod event;
pub mod logger;
pub mod middleware;
pub mod sanitize;
pub mod storage;

pub use context::{
    current_context, current_logger, in_current_scope, scope, spawn, AuditRequest,
    RequestContext, RequestContextBuilder,
};
pub use event::{ActionType, AuditLogEntry, AuditSeverity, NewAuditEntry, Outcome, ResourceType};
pub use logger::{log, set_actor, Actor, AuditLogger};
pub use middleware::{
    audit_layer, audit_middleware, AuditMiddleware, AuditScope, CookieSessionResolver,
    ScopeState, SessionResolver,
};
pub use sanitize::Sanitizer;
pub use storage::{AuditSink, MemorySink, TracingSink};

#[cfg(feature = "database")]
pub use storage::PgAuditSink;
