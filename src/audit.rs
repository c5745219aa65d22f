//! Operation Audit Log
//!
//! Best-effort side channel: every engine operation emits a record here, and
//! a failure to write it must never fail the business transaction. Errors go
//! to the diagnostic log and are otherwise swallowed.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WorkflowError;

/// Audit event kinds emitted by the engine
pub mod operation {
    pub const CREATE_WORKFLOW: &str = "CREATE_WORKFLOW";
    pub const APPLY_ACTION: &str = "APPLY_ACTION";
    pub const DELETE_WORKFLOW: &str = "DELETE_WORKFLOW";
    pub const EXPORT_WORKFLOW: &str = "EXPORT_WORKFLOW";
    pub const SHORTLINK_USE: &str = "SHORTLINK_USE";
}

/// Writes operation records to `operation_logs`
#[derive(Clone)]
pub struct AuditLog {
    pool: PgPool,
}

impl AuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an operation; failures are logged and swallowed
    pub async fn record(
        &self,
        operation: &str,
        workflow_id: Option<Uuid>,
        actor_code: Option<&str>,
        detail: serde_json::Value,
    ) {
        if let Err(err) = self
            .try_record(operation, workflow_id, actor_code, detail, None)
            .await
        {
            tracing::warn!(operation, %err, "audit log write failed");
        }
    }

    /// Record a short-link redemption together with its token hash, so later
    /// verifications can detect reuse. This one propagates errors: a
    /// redemption that cannot be recorded must not proceed. The unique index
    /// on the hash makes concurrent redemptions of one token lose here even
    /// when both passed the read-side check.
    pub async fn record_shortlink_use(
        &self,
        workflow_id: Option<Uuid>,
        detail: serde_json::Value,
        token_hash: &str,
    ) -> Result<(), WorkflowError> {
        self.try_record(
            operation::SHORTLINK_USE,
            workflow_id,
            None,
            detail,
            Some(token_hash),
        )
        .await
        .map_err(|err| match err {
            WorkflowError::Database(e)
                if e.as_database_error()
                    .is_some_and(|d| d.is_unique_violation()) =>
            {
                WorkflowError::Authorization("action token already redeemed".to_string())
            }
            other => other,
        })
    }

    /// Whether a token hash has already been recorded as redeemed
    pub async fn shortlink_used(&self, token_hash: &str) -> Result<bool, WorkflowError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM operation_logs WHERE operation = $1 AND token_hash = $2",
        )
        .bind(operation::SHORTLINK_USE)
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn try_record(
        &self,
        operation: &str,
        workflow_id: Option<Uuid>,
        actor_code: Option<&str>,
        detail: serde_json::Value,
        token_hash: Option<&str>,
    ) -> Result<(), WorkflowError> {
        sqlx::query(
            r#"
            INSERT INTO operation_logs (id, operation, workflow_id, actor_code, detail, token_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(operation)
        .bind(workflow_id)
        .bind(actor_code)
        .bind(detail)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
