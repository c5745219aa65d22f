//! Approver Configuration
//!
//! Assignee resolution for configured roles (BISO1/BISO2/CD/RSD) plus the
//! administrative surface over the `approver_configs` table. A configuration
//! either pins a fixed actor code or names an email that is resolved through
//! the user directory; the most recently created enabled row wins.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::types::{ApproverConfig, WorkflowRole, WorkflowType};

#[derive(Debug, sqlx::FromRow)]
struct ApproverConfigRow {
    id: Uuid,
    workflow_type: WorkflowType,
    role: WorkflowRole,
    actor_code: Option<String>,
    email: Option<String>,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ApproverConfigRow> for ApproverConfig {
    fn from(row: ApproverConfigRow) -> Self {
        Self {
            id: row.id,
            workflow_type: row.workflow_type,
            role: row.role,
            actor_code: row.actor_code,
            email: row.email,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Resolve the configured assignee for `(workflow_type, role)`, or None for
/// hierarchy roles and unconfigured pairs. Runs on a plain connection so the
/// engine can call it inside its transaction.
pub async fn resolve_configured_assignee(
    conn: &mut PgConnection,
    workflow_type: WorkflowType,
    role: WorkflowRole,
) -> Result<Option<String>, WorkflowError> {
    if !role.is_configured() {
        return Ok(None);
    }

    let config = sqlx::query_as::<_, ApproverConfigRow>(
        r#"
        SELECT id, workflow_type, role, actor_code, email, enabled, created_at, updated_at
        FROM approver_configs
        WHERE workflow_type = $1 AND role = $2 AND enabled
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(workflow_type)
    .bind(role)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(config) = config else {
        return Ok(None);
    };
    if let Some(actor_code) = config.actor_code.filter(|c| !c.is_empty()) {
        return Ok(Some(actor_code));
    }
    if let Some(email) = config.email.filter(|e| !e.is_empty()) {
        return resolve_actor_by_email(conn, &email, role).await;
    }
    Ok(None)
}

/// Directory lookup: actor code registered for `email` under `role`
pub async fn resolve_actor_by_email(
    conn: &mut PgConnection,
    email: &str,
    role: WorkflowRole,
) -> Result<Option<String>, WorkflowError> {
    let actor: Option<String> = sqlx::query_scalar(
        r#"
        SELECT actor_code FROM user_mappings
        WHERE email = $1 AND actor_role = $2
        LIMIT 1
        "#,
    )
    .bind(email)
    .bind(role)
    .fetch_optional(conn)
    .await?;
    Ok(actor.filter(|a| !a.is_empty()))
}

/// Optional filters for listing approver configurations
#[derive(Debug, Clone, Default)]
pub struct ApproverConfigFilter {
    pub workflow_type: Option<WorkflowType>,
    pub role: Option<WorkflowRole>,
    pub enabled: Option<bool>,
    pub email: Option<String>,
}

/// Administrative pass-through over `approver_configs`
#[derive(Clone)]
pub struct ApproverConfigStore {
    pool: PgPool,
}

impl ApproverConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        filter: &ApproverConfigFilter,
    ) -> Result<Vec<ApproverConfig>, WorkflowError> {
        let rows = sqlx::query_as::<_, ApproverConfigRow>(
            r#"
            SELECT id, workflow_type, role, actor_code, email, enabled, created_at, updated_at
            FROM approver_configs
            WHERE ($1::TEXT IS NULL OR workflow_type = $1)
              AND ($2::TEXT IS NULL OR role = $2)
              AND ($3::BOOLEAN IS NULL OR enabled = $3)
              AND ($4::TEXT IS NULL OR email = $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.workflow_type)
        .bind(filter.role)
        .bind(filter.enabled)
        .bind(filter.email.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create(
        &self,
        workflow_type: WorkflowType,
        role: WorkflowRole,
        actor_code: Option<String>,
        email: Option<String>,
    ) -> Result<ApproverConfig, WorkflowError> {
        if actor_code.as_deref().is_none_or(str::is_empty)
            && email.as_deref().is_none_or(str::is_empty)
        {
            return Err(WorkflowError::Validation(
                "approver config needs an actor code or an email".to_string(),
            ));
        }
        let row = sqlx::query_as::<_, ApproverConfigRow>(
            r#"
            INSERT INTO approver_configs (id, workflow_type, role, actor_code, email, enabled)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING id, workflow_type, role, actor_code, email, enabled, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_type)
        .bind(role)
        .bind(actor_code)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), WorkflowError> {
        let result = sqlx::query(
            "UPDATE approver_configs SET enabled = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(id));
        }
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), WorkflowError> {
        let result = sqlx::query("DELETE FROM approver_configs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(id));
        }
        Ok(())
    }
}
