//! PostgreSQL audit sink
//!
//! Each flushed batch is written inside one transaction, so a request's trail
//! is stored completely or not at all. Immutability is enforced with
//! `CREATE RULE` to silently discard UPDATE/DELETE operations.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::AuditSink;
use crate::audit::event::AuditLogEntry;
use crate::config::DatabaseConfig;
use crate::error::{Error, Result, SinkOperation};

// 21 binds per row keeps a batch well under Postgres' 65535 parameter limit
const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// PostgreSQL-backed audit sink
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Create a sink over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a dedicated pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| {
                Error::sink(
                    SinkOperation::Initialize,
                    format!("Failed to connect to audit database: {}", e),
                )
            })?;

        Ok(Self::new(pool))
    }

    /// Initialize the audit_log_entries table, indexes and immutability rules
    ///
    /// Should be called once during application startup.
    pub async fn initialize(&self) -> Result<()> {
        let init = |e: sqlx::Error, what: &str| {
            Error::sink(SinkOperation::Initialize, format!("Failed to create {}: {}", what, e))
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log_entries (
                id TEXT PRIMARY KEY,
                occurred_at TIMESTAMPTZ NOT NULL,
                action_type TEXT NOT NULL,
                action_description TEXT NOT NULL,
                target_resource_type TEXT NOT NULL,
                target_resource_id TEXT,
                outcome TEXT NOT NULL,
                severity TEXT NOT NULL,
                actor_profile_id TEXT,
                actor_provider TEXT,
                correlation_id TEXT NOT NULL,
                request_id TEXT NOT NULL,
                session_id TEXT,
                ip_address TEXT,
                user_agent TEXT,
                request_method TEXT NOT NULL,
                request_path TEXT NOT NULL,
                duration_ms BIGINT NOT NULL,
                sequence_number BIGINT NOT NULL,
                parent_event_id TEXT,
                metadata JSONB,
                UNIQUE (request_id, sequence_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| init(e, "audit_log_entries table"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_log_entries_correlation ON audit_log_entries (correlation_id, occurred_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| init(e, "audit correlation index"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_log_entries_actor ON audit_log_entries (actor_profile_id, occurred_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| init(e, "audit actor index"))?;

        sqlx::query(
            r#"
            DO $$
            BEGIN
                IF NOT EXISTS (
                    SELECT 1 FROM pg_rules
                    WHERE rulename = 'audit_log_no_update' AND tablename = 'audit_log_entries'
                ) THEN
                    CREATE RULE audit_log_no_update AS ON UPDATE TO audit_log_entries DO INSTEAD NOTHING;
                END IF;

                IF NOT EXISTS (
                    SELECT 1 FROM pg_rules
                    WHERE rulename = 'audit_log_no_delete' AND tablename = 'audit_log_entries'
                ) THEN
                    CREATE RULE audit_log_no_delete AS ON DELETE TO audit_log_entries DO INSTEAD NOTHING;
                END IF;
            END
            $$;
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| init(e, "audit immutability rules"))?;

        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn write_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::sink(
                SinkOperation::Transaction,
                format!("Failed to begin audit transaction: {}", e),
            )
        })?;

        for chunk in entries.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO audit_log_entries (
                    id, occurred_at, action_type, action_description,
                    target_resource_type, target_resource_id, outcome, severity,
                    actor_profile_id, actor_provider, correlation_id, request_id,
                    session_id, ip_address, user_agent, request_method, request_path,
                    duration_ms, sequence_number, parent_event_id, metadata
                ) "#,
            );

            builder.push_values(chunk, |mut row, entry| {
                row.push_bind(entry.id.as_str())
                    .push_bind(entry.occurred_at)
                    .push_bind(entry.action_type.as_str())
                    .push_bind(&entry.action_description)
                    .push_bind(entry.target_resource_type.as_str())
                    .push_bind(&entry.target_resource_id)
                    .push_bind(entry.outcome.as_str())
                    .push_bind(entry.severity.as_str())
                    .push_bind(&entry.actor_profile_id)
                    .push_bind(&entry.actor_provider)
                    .push_bind(entry.correlation_id.as_str())
                    .push_bind(entry.request_id.as_str())
                    .push_bind(&entry.session_id)
                    .push_bind(&entry.ip_address)
                    .push_bind(&entry.user_agent)
                    .push_bind(&entry.request_method)
                    .push_bind(&entry.request_path)
                    .push_bind(i64::try_from(entry.duration_ms).unwrap_or(i64::MAX))
                    .push_bind(i64::try_from(entry.sequence_number).unwrap_or(i64::MAX))
                    .push_bind(entry.parent_event_id.as_ref().map(|p| p.as_str()))
                    .push_bind(
                        entry
                            .metadata
                            .as_ref()
                            .map(|m| sqlx::types::Json(m.clone())),
                    );
            });

            // Dropping `tx` on error rolls the whole batch back
            builder.build().execute(&mut *tx).await.map_err(|e| {
                Error::sink(
                    SinkOperation::Insert,
                    format!("Failed to insert audit batch: {}", e),
                )
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::sink(
                SinkOperation::Transaction,
                format!("Failed to commit audit batch: {}", e),
            )
        })?;

        Ok(())
    }
}
