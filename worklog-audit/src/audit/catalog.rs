//! Action catalog
//!
//! Factory functions for the business events the dashboard records. Each one
//! returns a [`NewAuditEntry`]; the logger fills in correlation, actor and
//! sequencing fields when the entry is logged.
//!
//! ```rust,ignore
//! use worklog_audit::audit::{self, catalog};
//!
//! audit::log(catalog::worklog_saved("PROJ-42", 5400));
//! ```

use super::event::{ActionType, AuditSeverity, NewAuditEntry, ResourceType};

/// A user signed in through an identity provider
pub fn sign_in_success(profile_id: &str, provider: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::Authentication,
        ResourceType::Session,
        format!("User signed in via {}", provider),
    )
    .with_resource_id(profile_id)
    .with_metadata("provider", provider)
}

/// A sign-in attempt was rejected
pub fn sign_in_failure(provider: &str, reason: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::Authentication,
        ResourceType::Session,
        format!("Sign-in via {} failed: {}", provider, reason),
    )
    .failed(AuditSeverity::Warning)
    .with_metadata("provider", provider)
    .with_metadata("reason", reason)
}

pub fn sign_out(profile_id: &str) -> NewAuditEntry {
    NewAuditEntry::new(ActionType::Authentication, ResourceType::Session, "User signed out")
        .with_resource_id(profile_id)
}

/// An OAuth access token was refreshed for a linked account
pub fn token_refresh(provider: &str, account_id: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::TokenRefresh,
        ResourceType::Token,
        format!("Refreshed {} access token", provider),
    )
    .with_resource_id(account_id)
    .with_metadata("provider", provider)
}

/// Refreshing a token failed; the account usually needs re-linking
pub fn token_refresh_failure(provider: &str, account_id: &str, reason: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::TokenRefresh,
        ResourceType::Token,
        format!("Failed to refresh {} access token", provider),
    )
    .with_resource_id(account_id)
    .failed(AuditSeverity::Error)
    .with_metadata("provider", provider)
    .with_metadata("reason", reason)
}

/// A provider account was linked to an existing profile
pub fn account_linked(profile_id: &str, provider: &str, account_id: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::DataMutation,
        ResourceType::Account,
        format!("Linked {} account to profile", provider),
    )
    .with_resource_id(account_id)
    .with_metadata("profile_id", profile_id)
    .with_metadata("provider", provider)
}

/// A worklog was written to an issue
pub fn worklog_saved(issue_key: &str, time_spent_seconds: u64) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::DataMutation,
        ResourceType::Worklog,
        format!("Saved worklog on {}", issue_key),
    )
    .with_resource_id(issue_key)
    .with_metadata("issue", issue_key)
    .with_metadata("time_spent_seconds", time_spent_seconds)
}

pub fn worklog_save_failed(issue_key: &str, reason: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::DataMutation,
        ResourceType::Worklog,
        format!("Failed to save worklog on {}", issue_key),
    )
    .with_resource_id(issue_key)
    .failed(AuditSeverity::Error)
    .with_metadata("issue", issue_key)
    .with_metadata("reason", reason)
}

pub fn worklog_deleted(issue_key: &str, worklog_id: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::DataMutation,
        ResourceType::Worklog,
        format!("Deleted worklog {} on {}", worklog_id, issue_key),
    )
    .with_resource_id(worklog_id)
    .with_metadata("issue", issue_key)
}

/// User settings changed; only the names of changed fields are recorded
pub fn settings_updated(changed_fields: &[&str]) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::Configuration,
        ResourceType::Settings,
        "Updated user settings",
    )
    .with_metadata("changed_fields", changed_fields.to_vec())
}

/// A request was refused for lack of a session or permission
pub fn access_denied(resource_type: ResourceType, resource_id: &str, reason: &str) -> NewAuditEntry {
    NewAuditEntry::new(
        ActionType::Authorization,
        resource_type,
        format!("Access denied: {}", reason),
    )
    .with_resource_id(resource_id)
    .failed(AuditSeverity::Warning)
    .with_metadata("reason", reason)
}

/// A call to Jira or GitLab failed
pub fn external_api_failure(service: &str, endpoint: &str, status: Option<u16>) -> NewAuditEntry {
    let entry = NewAuditEntry::new(
        ActionType::ExternalApi,
        ResourceType::Other,
        format!("{} request to {} failed", service, endpoint),
    )
    .failed(AuditSeverity::Error)
    .with_metadata("service", service)
    .with_metadata("endpoint", endpoint);

    match status {
        Some(status) => entry.with_metadata("status", status),
        None => entry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::Outcome;
    use serde_json::json;

    #[test]
    fn test_sign_in_success() {
        let entry = sign_in_success("profile-1", "jira");
        assert_eq!(entry.action_type, ActionType::Authentication);
        assert_eq!(entry.target_resource_type, ResourceType::Session);
        assert_eq!(entry.target_resource_id.as_deref(), Some("profile-1"));
        assert_eq!(entry.outcome, Outcome::Success);
        assert_eq!(entry.severity, AuditSeverity::Info);
        assert_eq!(entry.action_description, "User signed in via jira");
    }

    #[test]
    fn test_failures_carry_outcome_and_severity() {
        let denied = access_denied(ResourceType::Worklog, "PROJ-1", "no session");
        assert_eq!(denied.outcome, Outcome::Failure);
        assert_eq!(denied.severity, AuditSeverity::Warning);

        let refresh = token_refresh_failure("gitlab", "acct-9", "invalid_grant");
        assert_eq!(refresh.outcome, Outcome::Failure);
        assert_eq!(refresh.severity, AuditSeverity::Error);

        let sign_in = sign_in_failure("jira", "bad password");
        assert_eq!(sign_in.outcome, Outcome::Failure);
        assert_eq!(sign_in.severity, AuditSeverity::Warning);
    }

    #[test]
    fn test_worklog_saved_metadata() {
        let entry = worklog_saved("PROJ-42", 5400);
        let metadata = entry.metadata.unwrap();
        assert_eq!(metadata["issue"], json!("PROJ-42"));
        assert_eq!(metadata["time_spent_seconds"], json!(5400));
    }

    #[test]
    fn test_settings_updated_lists_fields() {
        let entry = settings_updated(&["timezone", "default_project"]);
        assert_eq!(entry.action_type, ActionType::Configuration);
        assert_eq!(
            entry.metadata.unwrap()["changed_fields"],
            json!(["timezone", "default_project"])
        );
    }

    #[test]
    fn test_external_api_failure_status_is_optional() {
        let with_status = external_api_failure("gitlab", "/api/v4/commits", Some(502));
        assert_eq!(with_status.metadata.unwrap()["status"], json!(502));

        let without = external_api_failure("jira", "/rest/api/3/worklog", None);
        assert!(!without.metadata.unwrap().contains_key("status"));
    }

    #[test]
    fn test_catalog_metadata_survives_redaction() {
        use crate::audit::sanitize::{sanitize_metadata, REDACTED};

        let entries = [
            sign_in_success("p", "jira"),
            sign_in_failure("jira", "denied"),
            sign_out("p"),
            token_refresh("gitlab", "a"),
            token_refresh_failure("gitlab", "a", "expired"),
            account_linked("p", "gitlab", "a"),
            worklog_saved("PROJ-1", 60),
            worklog_save_failed("PROJ-1", "conflict"),
            worklog_deleted("PROJ-1", "10001"),
            settings_updated(&["timezone"]),
            access_denied(ResourceType::Settings, "s", "no session"),
            external_api_failure("jira", "/myself", Some(401)),
        ];

        for entry in entries {
            if let Some(metadata) = entry.metadata {
                let sanitized = sanitize_metadata(&metadata);
                assert!(
                    sanitized.values().all(|v| v != REDACTED),
                    "{} lost metadata to redaction",
                    entry.action_description
                );
            }
        }
    }
}
