//! Type-safe identifiers using the TypeID specification
//!
//! Every identifier the audit trail hands out is a TypeID over a UUIDv7, so ids
//! are globally unique with high probability and sort by creation time:
//!
//! - [`CorrelationId`] (`cor_…`): groups every entry of one logical user flow,
//!   possibly spanning several HTTP requests
//! - [`RequestId`] (`req_…`): exactly one inbound HTTP request
//! - [`EventId`] (`evt_…`): one audit log entry
//!
//! ```rust
//! use worklog_audit::ids::RequestId;
//!
//! let id = RequestId::new();
//! assert!(id.as_str().starts_with("req_"));
//! ```

use mti::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Error type for typed id parsing.
#[derive(Debug, thiserror::Error)]
pub enum TypedIdError {
    /// The value could not be parsed as a valid TypeID.
    #[error("failed to parse id: {0}")]
    Parse(#[from] MagicTypeIdError),

    /// The prefix was not the expected value.
    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        /// The expected prefix.
        expected: String,
        /// The actual prefix found.
        actual: String,
    },
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(MagicTypeId);

        impl $name {
            /// The prefix used for this id type
            pub const PREFIX: &'static str = $prefix;

            /// Creates a new id backed by a UUIDv7 (time-sortable).
            #[must_use]
            pub fn new() -> Self {
                Self(Self::PREFIX.create_type_id::<V7>())
            }

            /// Returns the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Returns the prefix portion of the id.
            #[must_use]
            pub fn prefix(&self) -> &str {
                self.0.prefix().as_str()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypedIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mti = MagicTypeId::from_str(s)?;

                if mti.prefix().as_str() != Self::PREFIX {
                    return Err(TypedIdError::InvalidPrefix {
                        expected: Self::PREFIX.to_string(),
                        actual: mti.prefix().as_str().to_string(),
                    });
                }

                Ok(Self(mti))
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypedIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

typed_id!(
    /// Identifier shared by every entry of one logical user flow.
    ///
    /// Fresh per request unless a caller deliberately carries one across an
    /// OAuth redirect chain.
    CorrelationId,
    "cor"
);

typed_id!(
    /// Identifier of exactly one inbound HTTP request.
    RequestId,
    "req"
);

typed_id!(
    /// Identifier of one audit log entry, allocated when the entry is logged.
    EventId,
    "evt"
);
