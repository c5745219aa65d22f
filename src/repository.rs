//! Workflow Repository
//!
//! Database persistence for workflows, their steps, action records, and
//! attachment metadata.
//!
//! NOTE: All queries use runtime-checked sqlx::query() instead of
//! compile-time sqlx::query!() macros because the tables are created by
//! migrations that may not exist at compile time.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::steps::StepDef;
use crate::types::{
    Attachment, Workflow, WorkflowAction, WorkflowActionRecord, WorkflowDetail, WorkflowStatus,
    WorkflowStep, WorkflowType,
};

/// A workflow with its ordered steps, as returned by list queries
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowSummary {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub steps: Vec<WorkflowStep>,
}

/// Filters for list and export queries
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub workflow_type: Option<WorkflowType>,
    pub status: Option<WorkflowStatus>,
    /// Restrict to workflows this actor submitted or is the current step's
    /// assignee for
    pub actor_code: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Repository for workflow persistence
#[derive(Clone)]
pub struct WorkflowRepository {
    pool: PgPool,
}

impl WorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a workflow together with its steps in one transaction
    pub async fn insert_with_steps(
        &self,
        workflow: &Workflow,
        steps: &[(StepDef, Option<String>)],
    ) -> Result<(), WorkflowError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows
            (id, workflow_type, status, title, payload, submitted_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.workflow_type)
        .bind(workflow.status)
        .bind(&workflow.title)
        .bind(&workflow.payload)
        .bind(&workflow.submitted_by)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await?;

        for (step, assignee) in steps {
            sqlx::query(
                r#"
                INSERT INTO workflow_steps (id, workflow_id, sequence, role, status, assignee)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(workflow.id)
            .bind(step.sequence)
            .bind(step.role)
            .bind(WorkflowStatus::Draft)
            .bind(assignee)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load a workflow and its steps with the workflow row locked.
    ///
    /// FOR UPDATE NOWAIT makes the loser of a concurrent act() race fail
    /// immediately with a lock error, surfaced as `Conflict` so the caller
    /// retries instead of reading a stale current step.
    pub async fn load_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<(Workflow, Vec<WorkflowStep>), WorkflowError> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, workflow_type, status, title, payload, submitted_by, created_at, updated_at
            FROM workflows
            WHERE id = $1
            FOR UPDATE NOWAIT
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(WorkflowError::from_locking)?
        .ok_or(WorkflowError::NotFound(id))?;

        let steps = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, workflow_id, sequence, role, status, assignee, created_at, updated_at
            FROM workflow_steps
            WHERE workflow_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(id)
        .fetch_all(conn)
        .await?;

        Ok((row.into(), steps.into_iter().map(Into::into).collect()))
    }

    pub async fn update_step_status(
        conn: &mut PgConnection,
        step_id: Uuid,
        status: WorkflowStatus,
    ) -> Result<(), WorkflowError> {
        sqlx::query("UPDATE workflow_steps SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(step_id)
            .bind(status)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn update_step_assignee(
        conn: &mut PgConnection,
        step_id: Uuid,
        assignee: &str,
    ) -> Result<(), WorkflowError> {
        sqlx::query("UPDATE workflow_steps SET assignee = $2, updated_at = NOW() WHERE id = $1")
            .bind(step_id)
            .bind(assignee)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Reset every step of a workflow to its initial state; `return` also
    /// clears assignees so the chain re-resolves on the next submission
    pub async fn reset_steps(
        conn: &mut PgConnection,
        workflow_id: Uuid,
        clear_assignees: bool,
    ) -> Result<(), WorkflowError> {
        let sql = if clear_assignees {
            "UPDATE workflow_steps SET status = $2, assignee = NULL, updated_at = NOW() WHERE workflow_id = $1"
        } else {
            "UPDATE workflow_steps SET status = $2, updated_at = NOW() WHERE workflow_id = $1"
        };
        sqlx::query(sql)
            .bind(workflow_id)
            .bind(WorkflowStatus::Draft)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn update_workflow_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: WorkflowStatus,
    ) -> Result<(), WorkflowError> {
        sqlx::query("UPDATE workflows SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Append one immutable action record
    pub async fn insert_action(
        conn: &mut PgConnection,
        workflow_id: Uuid,
        action: WorkflowAction,
        actor_code: Option<&str>,
        comment: &str,
    ) -> Result<(), WorkflowError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_actions (id, workflow_id, action, actor_code, comment)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(action)
        .bind(actor_code)
        .bind(comment)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn count_attachments(
        conn: &mut PgConnection,
        workflow_id: Uuid,
    ) -> Result<i64, WorkflowError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attachments WHERE workflow_id = $1")
                .bind(workflow_id)
                .fetch_one(conn)
                .await?;
        Ok(count)
    }

    pub async fn add_attachment(
        &self,
        workflow_id: Uuid,
        step_id: Option<Uuid>,
        filename: &str,
        url: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<Attachment, WorkflowError> {
        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            INSERT INTO attachments (id, workflow_id, step_id, filename, url, mime_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, workflow_id, step_id, filename, url, mime_type, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(step_id)
        .bind(filename)
        .bind(url)
        .bind(mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                WorkflowError::NotFound(workflow_id)
            }
            _ => WorkflowError::Database(err),
        })?;
        Ok(row.into())
    }

    /// Load a workflow with steps, actions, and attachments
    pub async fn find_detail(&self, id: Uuid) -> Result<WorkflowDetail, WorkflowError> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, workflow_type, status, title, payload, submitted_by, created_at, updated_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WorkflowError::NotFound(id))?;

        let steps = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, workflow_id, sequence, role, status, assignee, created_at, updated_at
            FROM workflow_steps WHERE workflow_id = $1 ORDER BY sequence ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let actions = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, workflow_id, action, actor_code, comment, created_at
            FROM workflow_actions WHERE workflow_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let attachments = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, workflow_id, step_id, filename, url, mime_type, created_at
            FROM attachments WHERE workflow_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(WorkflowDetail {
            workflow: row.into(),
            steps: steps.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
            attachments: attachments.into_iter().map(Into::into).collect(),
        })
    }

    /// List workflows matching the filter, newest first, each with its steps
    pub async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowSummary>, WorkflowError> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT w.id, w.workflow_type, w.status, w.title, w.payload, w.submitted_by,
                   w.created_at, w.updated_at
            FROM workflows w
            WHERE ($1::TEXT IS NULL OR w.workflow_type = $1)
              AND ($2::TEXT IS NULL OR w.status = $2)
              AND ($3::TEXT IS NULL
                   OR w.submitted_by = $3
                   OR (w.status <> 'DRAFT' AND EXISTS (
                         SELECT 1 FROM workflow_steps s
                         WHERE s.workflow_id = w.id
                           AND s.status = 'IN_PROGRESS'
                           AND s.assignee = $3)))
              AND ($4::TIMESTAMPTZ IS NULL OR w.created_at >= $4)
              AND ($5::TIMESTAMPTZ IS NULL OR w.created_at <= $5)
            ORDER BY w.created_at DESC
            "#,
        )
        .bind(filter.workflow_type)
        .bind(filter.status)
        .bind(filter.actor_code.as_deref())
        .bind(filter.created_from)
        .bind(filter.created_to)
        .fetch_all(&self.pool)
        .await?;

        let workflows: Vec<Workflow> = rows.into_iter().map(Into::into).collect();
        let ids: Vec<Uuid> = workflows.iter().map(|w| w.id).collect();
        let mut steps_by_workflow = self.steps_for(&ids).await?;

        Ok(workflows
            .into_iter()
            .map(|workflow| {
                let steps = steps_by_workflow.remove(&workflow.id).unwrap_or_default();
                WorkflowSummary { workflow, steps }
            })
            .collect())
    }

    /// Full records for export: workflows plus steps, actions, attachments
    pub async fn export(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowDetail>, WorkflowError> {
        let summaries = self.list(filter).await?;
        let ids: Vec<Uuid> = summaries.iter().map(|s| s.workflow.id).collect();

        let action_rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, workflow_id, action, actor_code, comment, created_at
            FROM workflow_actions WHERE workflow_id = ANY($1) ORDER BY created_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let attachment_rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, workflow_id, step_id, filename, url, mime_type, created_at
            FROM attachments WHERE workflow_id = ANY($1) ORDER BY created_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut actions_by_workflow: std::collections::HashMap<Uuid, Vec<WorkflowActionRecord>> =
            std::collections::HashMap::new();
        for row in action_rows {
            actions_by_workflow
                .entry(row.workflow_id)
                .or_default()
                .push(row.into());
        }
        let mut attachments_by_workflow: std::collections::HashMap<Uuid, Vec<Attachment>> =
            std::collections::HashMap::new();
        for row in attachment_rows {
            attachments_by_workflow
                .entry(row.workflow_id)
                .or_default()
                .push(row.into());
        }

        Ok(summaries
            .into_iter()
            .map(|s| WorkflowDetail {
                actions: actions_by_workflow.remove(&s.workflow.id).unwrap_or_default(),
                attachments: attachments_by_workflow
                    .remove(&s.workflow.id)
                    .unwrap_or_default(),
                workflow: s.workflow,
                steps: s.steps,
            })
            .collect())
    }

    /// Submitter and status only, for the narrowly-scoped draft deletion
    pub async fn find_brief(
        &self,
        id: Uuid,
    ) -> Result<(Option<String>, WorkflowStatus), WorkflowError> {
        let brief: Option<(Option<String>, WorkflowStatus)> =
            sqlx::query_as("SELECT submitted_by, status FROM workflows WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        brief.ok_or(WorkflowError::NotFound(id))
    }

    /// Delete a workflow; steps, actions, and attachments cascade
    pub async fn delete(&self, id: Uuid) -> Result<(), WorkflowError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(id));
        }
        Ok(())
    }

    async fn steps_for(
        &self,
        workflow_ids: &[Uuid],
    ) -> Result<std::collections::HashMap<Uuid, Vec<WorkflowStep>>, WorkflowError> {
        if workflow_ids.is_empty() {
            return Ok(Default::default());
        }
        let rows = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, workflow_id, sequence, role, status, assignee, created_at, updated_at
            FROM workflow_steps WHERE workflow_id = ANY($1) ORDER BY sequence ASC
            "#,
        )
        .bind(workflow_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_workflow: std::collections::HashMap<Uuid, Vec<WorkflowStep>> =
            std::collections::HashMap::new();
        for row in rows {
            by_workflow
                .entry(row.workflow_id)
                .or_default()
                .push(row.into());
        }
        Ok(by_workflow)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct WorkflowRow {
    id: Uuid,
    workflow_type: WorkflowType,
    status: WorkflowStatus,
    title: String,
    payload: serde_json::Value,
    submitted_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Self {
            id: row.id,
            workflow_type: row.workflow_type,
            status: row.status,
            title: row.title,
            payload: row.payload,
            submitted_by: row.submitted_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    workflow_id: Uuid,
    sequence: i32,
    role: crate::types::WorkflowRole,
    status: WorkflowStatus,
    assignee: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StepRow> for WorkflowStep {
    fn from(row: StepRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            sequence: row.sequence,
            role: row.role,
            status: row.status,
            assignee: row.assignee,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    id: Uuid,
    workflow_id: Uuid,
    action: WorkflowAction,
    actor_code: Option<String>,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<ActionRow> for WorkflowActionRecord {
    fn from(row: ActionRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            action: row.action,
            actor_code: row.actor_code,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    workflow_id: Uuid,
    step_id: Option<Uuid>,
    filename: String,
    url: Option<String>,
    mime_type: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            step_id: row.step_id,
            filename: row.filename,
            url: row.url,
            mime_type: row.mime_type,
            created_at: row.created_at,
        }
    }
}
