//! # worklog-audit
//!
//! Request-scoped, buffered audit trail for the Jira/GitLab worklog dashboard.
//!
//! ## Features
//!
//! - **Ambient context**: correlation and request ids visible to any code in a
//!   request's future, with no context parameter
//! - **Buffered logging**: synchronous `log`, one atomic sink write per request
//! - **Guaranteed flush**: on success, error, panic and cancellation
//! - **Sanitization**: control characters, length limits, secret redaction, IP masking
//! - **Sinks**: in-memory, `tracing`, PostgreSQL (`database` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use worklog_audit::prelude::*;
//! use axum::routing::post;
//!
//! async fn save_worklog() -> &'static str {
//!     audit::log(catalog::worklog_saved("PROJ-42", 5400));
//!     "saved"
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let sink = audit::storage::from_config(&config).await?;
//!     let audit = AuditMiddleware::from_config(&config.audit, sink);
//!
//!     let app = audit_layer(Router::new().route("/api/worklogs", post(save_worklog)), audit);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod ids;
pub mod observability;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{
        self, audit_layer, audit_middleware, catalog, ActionType, AuditLogEntry, AuditLogger,
        AuditMiddleware, AuditScope, AuditSeverity, AuditSink, MemorySink, NewAuditEntry,
        Outcome, RequestContext, ResourceType, Sanitizer, SessionResolver, TracingSink,
    };

    #[cfg(feature = "database")]
    pub use crate::audit::PgAuditSink;

    pub use crate::config::{AuditConfig, Config, SinkKind};
    pub use crate::error::{Error, Result};
    pub use crate::ids::{CorrelationId, EventId, RequestId, TypedIdError};
    pub use crate::observability::init_tracing;

    pub use axum::Router;
}
