//! Operational logging
//!
//! The audit trail itself goes through an [`AuditSink`](crate::audit::AuditSink);
//! this module sets up the `tracing` subscriber that carries everything else,
//! including flush failures and, with the tracing sink, the audit events on
//! the `audit` target.

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Error, error::Result};

/// Initialize the global tracing subscriber
///
/// Uses `RUST_LOG` when set, otherwise `service.log_level`. Output is JSON
/// except in the `dev` environment.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.service.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.service.environment == "dev" {
        builder.compact().try_init()
    } else {
        builder.json().try_init()
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::info!(
        environment = %config.service.environment,
        "Tracing initialized for service: {}",
        config.service.name
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let config = Config::default();
        // Another test may already have installed a subscriber
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
