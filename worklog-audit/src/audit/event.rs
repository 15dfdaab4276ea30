//! Audit entry types
//!
//! [`NewAuditEntry`] is what business code hands to the logger: the action,
//! its outcome and optional metadata. The logger completes it into an
//! [`AuditLogEntry`] by merging in correlation ids, the current actor, the
//! sequence number and the elapsed duration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::ids::{CorrelationId, EventId, RequestId};

/// A fully-formed audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique, time-ordered entry identifier
    pub id: EventId,
    /// When the batch holding this entry was persisted (`None` while buffered)
    pub occurred_at: Option<DateTime<Utc>>,
    /// What happened
    pub action_type: ActionType,
    /// Human-readable description, sanitized
    pub action_description: String,
    /// Kind of resource acted on
    pub target_resource_type: ResourceType,
    /// Identifier of the resource acted on
    pub target_resource_id: Option<String>,
    /// Whether the action succeeded
    pub outcome: Outcome,
    /// Severity level
    pub severity: AuditSeverity,
    /// Profile the action is attributed to, once authentication has resolved
    pub actor_profile_id: Option<String>,
    /// Identity provider of the actor
    pub actor_provider: Option<String>,
    /// Logical flow this entry belongs to
    pub correlation_id: CorrelationId,
    /// HTTP request this entry was logged in
    pub request_id: RequestId,
    /// Browser session, if known when the request started
    pub session_id: Option<String>,
    /// Client address, masked per configuration
    pub ip_address: Option<String>,
    /// Client user agent, sanitized
    pub user_agent: Option<String>,
    /// Request method
    pub request_method: String,
    /// Request path
    pub request_path: String,
    /// Milliseconds between request start and the `log` call
    pub duration_ms: u64,
    /// Position within the logger that produced it, strictly increasing
    pub sequence_number: u64,
    /// Earlier entry of the same request this one is nested under
    pub parent_event_id: Option<EventId>,
    /// Free-form, sanitized metadata
    pub metadata: Option<Map<String, Value>>,
}

/// The caller-supplied part of an audit entry
///
/// Correlation, actor, sequence and timing fields are filled in by
/// [`AuditLogger::log`](super::AuditLogger::log).
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    /// What happened
    pub action_type: ActionType,
    /// Human-readable description
    pub action_description: String,
    /// Kind of resource acted on
    pub target_resource_type: ResourceType,
    /// Identifier of the resource acted on
    pub target_resource_id: Option<String>,
    /// Whether the action succeeded
    pub outcome: Outcome,
    /// Severity level
    pub severity: AuditSeverity,
    /// Earlier entry this one is nested under
    pub parent_event_id: Option<EventId>,
    /// Free-form metadata, sanitized on log
    pub metadata: Option<Map<String, Value>>,
}

impl NewAuditEntry {
    /// Create an entry with the given action, resource and description
    ///
    /// Defaults to a successful, informational outcome.
    pub fn new(
        action_type: ActionType,
        target_resource_type: ResourceType,
        action_description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            action_description: action_description.into(),
            target_resource_type,
            target_resource_id: None,
            outcome: Outcome::Success,
            severity: AuditSeverity::Info,
            parent_event_id: None,
            metadata: None,
        }
    }

    /// Set the target resource identifier
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.target_resource_id = Some(id.into());
        self
    }

    /// Set the outcome
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Mark the entry as failed with the given severity
    pub fn failed(mut self, severity: AuditSeverity) -> Self {
        self.outcome = Outcome::Failure;
        self.severity = severity;
        self
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Nest this entry under an earlier one
    pub fn with_parent(mut self, parent: EventId) -> Self {
        self.parent_event_id = Some(parent);
        self
    }

    /// Add a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replace the metadata map
    pub fn with_metadata_map(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Categories of audited actions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Sign-in, sign-out and OAuth callback handling
    Authentication,
    /// Access token refresh against an identity provider
    TokenRefresh,
    /// Permission checks
    Authorization,
    /// Reads of user data
    DataAccess,
    /// Creates, updates and deletes of user data
    DataMutation,
    /// Calls out to Jira, GitLab or other vendor APIs
    ExternalApi,
    /// User or system configuration changes
    Configuration,
    /// Application-defined action
    Custom(String),
}

impl ActionType {
    /// Application-defined action type
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or whitespace; an unnamed action is a
    /// programming error at the call site.
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(
            !name.trim().is_empty(),
            "custom audit action type must have a name"
        );
        Self::Custom(name)
    }

    /// Stable string form used for persistence
    pub fn as_str(&self) -> &str {
        match self {
            Self::Authentication => "authentication",
            Self::TokenRefresh => "token_refresh",
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::DataMutation => "data_mutation",
            Self::ExternalApi => "external_api",
            Self::Configuration => "configuration",
            Self::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of resources an action can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A browser session
    Session,
    /// A user profile
    Profile,
    /// A linked Jira or GitLab account
    Account,
    /// An OAuth access or refresh token
    Token,
    /// A Jira worklog
    Worklog,
    /// A GitLab commit
    Commit,
    /// User settings
    Settings,
    /// Anything else
    Other,
}

impl ResourceType {
    /// Stable string form used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Profile => "profile",
            Self::Account => "account",
            Self::Token => "token",
            Self::Worklog => "worklog",
            Self::Commit => "commit",
            Self::Settings => "settings",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The action completed
    Success,
    /// The action failed
    Failure,
}

impl Outcome {
    /// Stable string form used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit entry severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Unexpected but handled
    Warning,
    /// Operation failed
    Error,
    /// Requires immediate attention
    Critical,
}

impl AuditSeverity {
    /// Stable string form used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
