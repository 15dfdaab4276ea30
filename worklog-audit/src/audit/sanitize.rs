//! Sanitization of audit data before it is buffered or persisted
//!
//! Strips log-injection characters, truncates oversized strings, redacts
//! credential-looking metadata keys and optionally masks client addresses.
//! Every function here is total: malformed input degrades to a pass-through or
//! a truncation, never an error.

use serde_json::{Map, Value};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Default maximum length for free text and metadata strings, in characters
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1000;

/// Default maximum length for user agent strings, in characters
pub const DEFAULT_MAX_USER_AGENT_LENGTH: usize = 500;

/// Replacement for values under a sensitive key
pub const REDACTED: &str = "[REDACTED]";

/// Appended to metadata strings that were cut short
pub const TRUNCATION_MARKER: &str = "...";

/// Placeholder for a masked IPv4 octet
pub const MASKED_IPV4_OCTET: &str = "xxx";

/// Placeholder for a masked IPv6 segment
pub const MASKED_IPV6_SEGMENT: &str = "xxxx";

/// Substrings that mark a metadata key as sensitive (matched case-insensitively)
pub const SENSITIVE_KEY_PATTERNS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "authorization",
    "cookie",
    "credential",
];

/// Sanitizer with configurable length limits
///
/// The free functions in this module use [`Sanitizer::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    max_text_length: usize,
    max_user_agent_length: usize,
    mask_ip_addresses: bool,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_user_agent_length: DEFAULT_MAX_USER_AGENT_LENGTH,
            mask_ip_addresses: false,
        }
    }
}

impl Sanitizer {
    /// Create a sanitizer with the default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sanitizer from the audit configuration
    pub fn from_config(config: &crate::config::AuditConfig) -> Self {
        Self {
            max_text_length: config.max_text_length,
            max_user_agent_length: config.max_user_agent_length,
            mask_ip_addresses: config.mask_ip_addresses,
        }
    }

    /// Set the maximum free text length
    pub fn with_max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    /// Set the maximum user agent length
    pub fn with_max_user_agent_length(mut self, max: usize) -> Self {
        self.max_user_agent_length = max;
        self
    }

    /// Enable or disable IP masking for [`Sanitizer::ip_address`]
    pub fn with_ip_masking(mut self, enabled: bool) -> Self {
        self.mask_ip_addresses = enabled;
        self
    }

    /// Maximum free text length
    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    /// Replace control characters with spaces and truncate to the text limit
    pub fn text(&self, input: &str) -> String {
        strip_and_truncate(input, self.max_text_length)
    }

    /// Same treatment as [`Sanitizer::text`] with the shorter user agent limit
    pub fn user_agent(&self, input: Option<&str>) -> Option<String> {
        input.map(|ua| strip_and_truncate(ua, self.max_user_agent_length))
    }

    /// Apply the configured masking policy to an address
    pub fn ip_address(&self, ip: Option<&str>) -> Option<String> {
        sanitize_ip_address(ip, self.mask_ip_addresses)
    }

    /// Redact sensitive keys and truncate long strings, recursing into nested maps
    ///
    /// Returns a new map; the input is left untouched.
    pub fn metadata(&self, input: &Map<String, Value>) -> Map<String, Value> {
        input
            .iter()
            .map(|(key, value)| (key.clone(), self.metadata_value(key, value)))
            .collect()
    }

    fn metadata_value(&self, key: &str, value: &Value) -> Value {
        if is_sensitive_key(key) {
            return Value::String(REDACTED.to_string());
        }

        match value {
            Value::String(s) => {
                // NUL is not storable in Postgres text or jsonb
                let kept = truncate_chars(s, self.max_text_length);
                let mut cleaned = kept.replace('\0', " ");
                if kept.len() < s.len() {
                    cleaned.push_str(TRUNCATION_MARKER);
                }
                Value::String(cleaned)
            }
            Value::Object(nested) => Value::Object(self.metadata(nested)),
            other => other.clone(),
        }
    }
}

/// Replace newlines, carriage returns, tabs and NUL with spaces, then truncate
pub fn sanitize_text(input: &str) -> String {
    Sanitizer::default().text(input)
}

/// Sanitize a user agent with the default 500 character limit
pub fn sanitize_user_agent(input: Option<&str>) -> Option<String> {
    Sanitizer::default().user_agent(input)
}

/// Redact and truncate metadata with the default limits
pub fn sanitize_metadata(input: &Map<String, Value>) -> Map<String, Value> {
    Sanitizer::default().metadata(input)
}

/// Mask the last IPv4 octet or IPv6 segment when `mask_last_octet` is set
///
/// Anything that does not parse as an address is returned unchanged.
pub fn sanitize_ip_address(ip: Option<&str>, mask_last_octet: bool) -> Option<String> {
    let ip = ip?;
    if !mask_last_octet {
        return Some(ip.to_string());
    }

    if ip.parse::<Ipv4Addr>().is_ok() {
        if let Some((head, _)) = ip.rsplit_once('.') {
            return Some(format!("{head}.{MASKED_IPV4_OCTET}"));
        }
    }

    if ip.parse::<Ipv6Addr>().is_ok() {
        if let Some((head, _)) = ip.rsplit_once(':') {
            return Some(format!("{head}:{MASKED_IPV6_SEGMENT}"));
        }
    }

    Some(ip.to_string())
}

/// Whether a metadata key looks like it carries a credential
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

fn strip_and_truncate(input: &str, max_chars: usize) -> String {
    truncate_chars(input, max_chars)
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' | '\0' => ' ',
            other => other,
        })
        .collect()
}

/// Cut at a character boundary so multi-byte sequences are never split
fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &input[..byte_idx],
        None => input,
    }
}
