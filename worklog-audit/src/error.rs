//! Error types for the audit trail
//!
//! Only configuration and persistence failures are represented here. Sanitization
//! never fails, and a missing ambient logger is a valid inert state rather than
//! an error.

use std::fmt;
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Database operation being performed when a sink error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkOperation {
    /// Preparing the backing store (table creation, indexes)
    Initialize,
    /// Opening or committing the batch transaction
    Transaction,
    /// Inserting a batch of entries
    Insert,
}

impl fmt::Display for SinkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::Transaction => write!(f, "transaction"),
            Self::Insert => write!(f, "insert"),
        }
    }
}

/// Main error type for the audit crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// The sink rejected a batch; nothing from the batch was persisted
    #[error("Audit sink {operation} failed: {message}")]
    Sink {
        /// Operation that failed
        operation: SinkOperation,
        /// Backend-specific description
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a sink error for the given operation
    pub fn sink(operation: SinkOperation, message: impl Into<String>) -> Self {
        Self::Sink {
            operation,
            message: message.into(),
        }
    }

    /// Whether this error came from the persistence sink
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, Self::Sink { .. })
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
