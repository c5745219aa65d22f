//! Workflow Engine
//!
//! The orchestrator over the approval workflow lifecycle. Creation runs the
//! payload validator, chain builder, approver resolution, and scope checks
//! before persisting the workflow with its steps; actions run the state
//! machine, permission matrix, and scope re-checks inside one transaction
//! that locks the workflow row. Audit records are emitted best-effort after
//! commit and never fail the operation.

use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::approver::resolve_configured_assignee;
use crate::audit::{operation, AuditLog};
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::permission::allowed_actions;
use crate::repository::{WorkflowFilter, WorkflowRepository, WorkflowSummary};
use crate::scope::ScopeResolver;
use crate::shortlink::ShortLinkService;
use crate::state::can_transition;
use crate::steps::{build_steps, StepDef};
use crate::types::{
    Attachment, Workflow, WorkflowAction, WorkflowDetail, WorkflowRole, WorkflowStatus,
    WorkflowStep, WorkflowType,
};
use crate::validation::{distribution_hospitals, payload_hospital_code, validate_payload};

/// Request to create a workflow
#[derive(Debug, Clone)]
pub struct CreateWorkflow {
    pub workflow_type: WorkflowType,
    pub payload: serde_json::Value,
    pub title: Option<String>,
    pub submitted_by: Option<String>,
}

/// Request to apply an action to a workflow
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: WorkflowAction,
    pub actor_code: Option<String>,
    pub role: Option<WorkflowRole>,
    pub comment: Option<String>,
}

/// The workflow execution engine
pub struct WorkflowEngine {
    repo: WorkflowRepository,
    scope: ScopeResolver,
    audit: AuditLog,
    shortlink: ShortLinkService,
}

impl WorkflowEngine {
    /// Create a new workflow engine over a connection pool
    pub fn new(pool: PgPool, config: EngineConfig) -> Self {
        let audit = AuditLog::new(pool.clone());
        Self {
            repo: WorkflowRepository::new(pool.clone()),
            scope: ScopeResolver::new(pool, config.scope_mode),
            shortlink: ShortLinkService::new(
                config.shortlink_key.clone(),
                config.shortlink_ttl,
                audit.clone(),
            ),
            audit,
        }
    }

    /// Scope resolver, for delegation pickers and callers that need raw
    /// hierarchy queries
    pub fn scope(&self) -> &ScopeResolver {
        &self.scope
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    /// Create a workflow in draft with its full approval chain.
    ///
    /// Configured roles get their assignee resolved now; hierarchy roles are
    /// left unassigned until submission or activation.
    pub async fn create(&self, request: CreateWorkflow) -> Result<WorkflowDetail, WorkflowError> {
        validate_payload(request.workflow_type, &request.payload)?;
        let chain = build_steps(request.workflow_type, &request.payload);

        let mut conn = self.repo.pool().acquire().await?;
        let mut steps: Vec<(StepDef, Option<String>)> = Vec::with_capacity(chain.len());
        for step in chain {
            let assignee = if step.role.is_configured() {
                resolve_configured_assignee(&mut conn, request.workflow_type, step.role).await?
            } else {
                None
            };
            steps.push((step, assignee));
        }
        drop(conn);

        if let (Some(submitter), Some(hospital)) = (
            request.submitted_by.as_deref(),
            payload_hospital_code(&request.payload),
        ) {
            self.scope.ensure_in_scope(submitter, hospital).await?;
        }

        if request.workflow_type == WorkflowType::CancelTargetHospital {
            if let Some(submitter) = request.submitted_by.as_deref() {
                let scope = self.scope.hospital_scope_for_actor(submitter).await?;
                // A reassignment submitter must own hospitals to reassign
                // from; this holds in every scope mode
                if scope.is_empty() {
                    return Err(WorkflowError::Authorization(format!(
                        "submitter {submitter} has no hospital scope to reassign"
                    )));
                }
                let hospitals = distribution_hospitals(&request.payload);
                let violations = self.scope.out_of_scope(&scope, &hospitals);
                if !violations.is_empty() {
                    return Err(WorkflowError::Authorization(format!(
                        "submitter may not reassign hospitals: {}",
                        violations.join(", ")
                    )));
                }
            }
        }

        let now = chrono::Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            workflow_type: request.workflow_type,
            status: WorkflowStatus::Draft,
            title: request.title.unwrap_or_default(),
            payload: request.payload,
            submitted_by: request.submitted_by,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_with_steps(&workflow, &steps).await?;
        info!(workflow_id = %workflow.id, workflow_type = %workflow.workflow_type, "workflow created");

        self.audit
            .record(
                operation::CREATE_WORKFLOW,
                Some(workflow.id),
                workflow.submitted_by.as_deref(),
                json!({ "type": workflow.workflow_type, "title": workflow.title }),
            )
            .await;

        self.repo.find_detail(workflow.id).await
    }

    // -----------------------------------------------------------------------
    // act
    // -----------------------------------------------------------------------

    /// Apply an action to a workflow.
    ///
    /// The whole read-validate-mutate-append sequence runs in one
    /// transaction with the workflow row locked; a concurrent act() on the
    /// same workflow fails with `Conflict` and should be retried.
    pub async fn act(
        &self,
        id: Uuid,
        request: ActionRequest,
    ) -> Result<WorkflowDetail, WorkflowError> {
        let mut tx = self.repo.pool().begin().await?;
        let (workflow, steps) = WorkflowRepository::load_for_update(&mut tx, id).await?;

        let actor = request.actor_code.as_deref().filter(|a| !a.is_empty());
        if request.role.is_some() && actor.is_none() {
            return Err(WorkflowError::Validation(
                "actorCode is required when a role is supplied".to_string(),
            ));
        }

        if !can_transition(workflow.status, request.action) {
            return Err(WorkflowError::InvalidTransition {
                status: workflow.status,
                action: request.action,
            });
        }

        if let Some(role) = request.role {
            if !allowed_actions(workflow.workflow_type, role).contains(&request.action) {
                return Err(WorkflowError::Authorization(format!(
                    "role {role} cannot perform {} on {}",
                    request.action, workflow.workflow_type
                )));
            }
        }

        // Only the initiator may submit or withdraw
        if matches!(
            request.action,
            WorkflowAction::Submit | WorkflowAction::Withdraw
        ) {
            if let (Some(submitter), Some(actor)) = (workflow.submitted_by.as_deref(), actor) {
                if submitter != actor {
                    return Err(WorkflowError::Authorization(format!(
                        "only the submitter {submitter} may {} this workflow",
                        request.action
                    )));
                }
            }
        }

        let current_step = steps
            .iter()
            .find(|s| s.status == WorkflowStatus::InProgress);
        if request.action.requires_current_step() {
            let current = current_step.ok_or(WorkflowError::NoCurrentStep)?;
            if let Some(role) = request.role {
                if role != current.role {
                    return Err(WorkflowError::Authorization(format!(
                        "current step requires role {}, not {role}",
                        current.role
                    )));
                }
            }
        }

        // Reassignment targets must stay within the approver's own scope
        if workflow.workflow_type == WorkflowType::CancelTargetHospital {
            if let (Some(actor), Some(role)) = (actor, request.role) {
                let scope = self.scope.hospital_scope(role, actor).await?;
                let hospitals = distribution_hospitals(&workflow.payload);
                let violations = self.scope.out_of_scope(&scope, &hospitals);
                if !violations.is_empty() {
                    return Err(WorkflowError::Authorization(format!(
                        "hospitals outside approver scope: {}",
                        violations.join(", ")
                    )));
                }
            }
        }

        let next_status = match request.action {
            WorkflowAction::Submit => {
                self.apply_submit(&mut tx, &workflow, &steps, &request, actor)
                    .await?
            }
            WorkflowAction::Approve => {
                // current_step checked above
                let current = current_step.ok_or(WorkflowError::NoCurrentStep)?;
                self.apply_approve(&mut tx, &workflow, &steps, current, actor, request.role)
                    .await?
            }
            WorkflowAction::Reject => {
                let current = current_step.ok_or(WorkflowError::NoCurrentStep)?;
                WorkflowRepository::update_step_status(&mut tx, current.id, WorkflowStatus::Rejected)
                    .await?;
                WorkflowStatus::Rejected
            }
            WorkflowAction::Return => {
                WorkflowRepository::reset_steps(&mut tx, id, true).await?;
                WorkflowStatus::Draft
            }
            WorkflowAction::Withdraw => {
                WorkflowRepository::reset_steps(&mut tx, id, false).await?;
                WorkflowStatus::Draft
            }
        };

        WorkflowRepository::update_workflow_status(&mut tx, id, next_status).await?;
        WorkflowRepository::insert_action(
            &mut tx,
            id,
            request.action,
            actor,
            request.comment.as_deref().unwrap_or(""),
        )
        .await?;
        tx.commit().await?;

        debug!(workflow_id = %id, action = %request.action, status = %next_status, "action applied");
        self.audit
            .record(
                operation::APPLY_ACTION,
                Some(id),
                actor,
                json!({ "action": request.action, "role": request.role }),
            )
            .await;

        self.repo.find_detail(id).await
    }

    async fn apply_submit(
        &self,
        tx: &mut sqlx::PgConnection,
        workflow: &Workflow,
        steps: &[WorkflowStep],
        request: &ActionRequest,
        actor: Option<&str>,
    ) -> Result<WorkflowStatus, WorkflowError> {
        // Submission evidence gate
        if workflow.workflow_type == WorkflowType::NewTargetHospital {
            let count = WorkflowRepository::count_attachments(tx, workflow.id).await?;
            if count == 0 {
                return Err(WorkflowError::Validation(
                    "new-target-hospital requires an attachment before submission".to_string(),
                ));
            }
        }

        let Some(first) = steps.first() else {
            return Ok(WorkflowStatus::Approved);
        };

        // Submitting counts as the submitter's own approval: when the
        // submitter holds the first step's role, skip straight to the next
        if request.role == Some(first.role) {
            WorkflowRepository::update_step_status(tx, first.id, WorkflowStatus::Approved).await?;
            let next = steps.iter().find(|s| s.sequence == first.sequence + 1);
            let Some(next) = next else {
                return Ok(WorkflowStatus::Approved);
            };
            self.fill_assignee(tx, workflow.workflow_type, next, first.role, actor)
                .await?;
            WorkflowRepository::update_step_status(tx, next.id, WorkflowStatus::InProgress).await?;
            return Ok(WorkflowStatus::InProgress);
        }

        if first.assignee.is_none() {
            if let (Some(role), Some(actor)) = (request.role, actor) {
                if !first.role.is_configured() {
                    if let Some(manager) = self.scope.direct_manager(role, actor).await? {
                        WorkflowRepository::update_step_assignee(tx, first.id, &manager).await?;
                    }
                }
            }
            if first.role.is_configured() {
                if let Some(assignee) =
                    resolve_configured_assignee(tx, workflow.workflow_type, first.role).await?
                {
                    WorkflowRepository::update_step_assignee(tx, first.id, &assignee).await?;
                }
            }
        }
        WorkflowRepository::update_step_status(tx, first.id, WorkflowStatus::InProgress).await?;
        Ok(WorkflowStatus::InProgress)
    }

    async fn apply_approve(
        &self,
        tx: &mut sqlx::PgConnection,
        workflow: &Workflow,
        steps: &[WorkflowStep],
        current: &WorkflowStep,
        actor: Option<&str>,
        acting_role: Option<WorkflowRole>,
    ) -> Result<WorkflowStatus, WorkflowError> {
        // Compliance sign-off needs documentary evidence on file
        if current.role == WorkflowRole::Cd {
            let count = WorkflowRepository::count_attachments(tx, workflow.id).await?;
            if count == 0 {
                return Err(WorkflowError::Validation(
                    "compliance approval requires an attachment on the workflow".to_string(),
                ));
            }
        }

        WorkflowRepository::update_step_status(tx, current.id, WorkflowStatus::Approved).await?;

        let next = steps.iter().find(|s| s.sequence == current.sequence + 1);
        let Some(next) = next else {
            return Ok(WorkflowStatus::Approved);
        };
        let from_role = acting_role.unwrap_or(current.role);
        self.fill_assignee(tx, workflow.workflow_type, next, from_role, actor)
            .await?;
        WorkflowRepository::update_step_status(tx, next.id, WorkflowStatus::InProgress).await?;
        Ok(WorkflowStatus::InProgress)
    }

    /// Resolve an unassigned step's assignee at activation time: configured
    /// roles from approver configuration, hierarchy roles one level up from
    /// the actor who just acted.
    async fn fill_assignee(
        &self,
        tx: &mut sqlx::PgConnection,
        workflow_type: WorkflowType,
        step: &WorkflowStep,
        acting_role: WorkflowRole,
        actor: Option<&str>,
    ) -> Result<(), WorkflowError> {
        if step.assignee.is_some() {
            return Ok(());
        }
        let assignee = if step.role.is_configured() {
            resolve_configured_assignee(tx, workflow_type, step.role).await?
        } else if let Some(actor) = actor {
            self.scope.direct_manager(acting_role, actor).await?
        } else {
            None
        };
        if let Some(assignee) = assignee {
            WorkflowRepository::update_step_assignee(tx, step.id, &assignee).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // queries
    // -----------------------------------------------------------------------

    /// Load one workflow with visibility rules applied.
    ///
    /// Drafts are visible only to their submitter; other workflows only to
    /// the submitter or the current step's assignee. Without an actor code
    /// no restriction applies (trusted internal callers).
    pub async fn find_one(
        &self,
        id: Uuid,
        actor_code: Option<&str>,
    ) -> Result<WorkflowDetail, WorkflowError> {
        let detail = self.repo.find_detail(id).await?;
        if let Some(actor) = actor_code.filter(|a| !a.is_empty()) {
            let is_submitter = detail.workflow.submitted_by.as_deref() == Some(actor);
            if detail.workflow.status == WorkflowStatus::Draft {
                if detail.workflow.submitted_by.is_some() && !is_submitter {
                    return Err(WorkflowError::Authorization(
                        "drafts are visible only to their submitter".to_string(),
                    ));
                }
            } else {
                let is_current_assignee = detail
                    .current_step()
                    .and_then(|s| s.assignee.as_deref())
                    .map(|a| a == actor)
                    .unwrap_or(false);
                if !is_submitter && !is_current_assignee {
                    return Err(WorkflowError::Authorization(
                        "not a participant of this workflow".to_string(),
                    ));
                }
            }
        }
        Ok(detail)
    }

    /// List workflows; with an actor code the result is restricted to
    /// workflows the actor submitted or is currently assigned to
    pub async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<WorkflowSummary>, WorkflowError> {
        self.repo.list(filter).await
    }

    /// Full records for export rendering; the caller is responsible for
    /// role-gating this surface
    pub async fn export_all(
        &self,
        filter: &WorkflowFilter,
        actor_code: Option<&str>,
        role: Option<WorkflowRole>,
    ) -> Result<Vec<WorkflowDetail>, WorkflowError> {
        let rows = self.repo.export(filter).await?;
        self.audit
            .record(
                operation::EXPORT_WORKFLOW,
                None,
                actor_code,
                json!({ "role": role, "count": rows.len() }),
            )
            .await;
        Ok(rows)
    }

    /// Delete a draft workflow; only the initiator may do this, and only
    /// while the workflow has not left draft
    pub async fn remove(&self, id: Uuid, actor_code: Option<&str>) -> Result<(), WorkflowError> {
        let (submitted_by, status) = self.repo.find_brief(id).await?;
        let actor = actor_code.filter(|a| !a.is_empty());
        if actor.is_none() || submitted_by.as_deref() != actor {
            return Err(WorkflowError::Authorization(
                "only the submitter may delete this workflow".to_string(),
            ));
        }
        if status != WorkflowStatus::Draft {
            return Err(WorkflowError::Validation(
                "only draft workflows can be deleted".to_string(),
            ));
        }
        self.repo.delete(id).await?;
        self.audit
            .record(operation::DELETE_WORKFLOW, Some(id), actor, json!({}))
            .await;
        Ok(())
    }

    /// Record attachment metadata against a workflow (and optionally a step)
    pub async fn add_attachment(
        &self,
        workflow_id: Uuid,
        step_id: Option<Uuid>,
        filename: &str,
        url: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<Attachment, WorkflowError> {
        self.repo
            .add_attachment(workflow_id, step_id, filename, url, mime_type)
            .await
    }

    // -----------------------------------------------------------------------
    // short links
    // -----------------------------------------------------------------------

    /// Issue a signed short-link token for acting on a workflow
    pub fn generate_shortlink(
        &self,
        workflow_id: Uuid,
        action: WorkflowAction,
        role: Option<WorkflowRole>,
    ) -> Result<String, WorkflowError> {
        self.shortlink.generate(workflow_id, action, role)
    }

    /// Redeem a short-link token: verify signature, expiry, and single-use,
    /// record the redemption, then apply the encoded action. The engine's
    /// usual rules still apply, so a role-carrying token needs an acting
    /// actor code.
    pub async fn redeem_shortlink(
        &self,
        token: &str,
        actor_code: Option<String>,
        comment: Option<String>,
    ) -> Result<WorkflowDetail, WorkflowError> {
        let verified = self.shortlink.verify(token).await?;
        self.audit
            .record_shortlink_use(
                Some(verified.claims.workflow_id),
                json!({
                    "action": verified.claims.action,
                    "role": verified.claims.role,
                    "via": "shortlink",
                }),
                &verified.token_hash,
            )
            .await?;
        self.act(
            verified.claims.workflow_id,
            ActionRequest {
                action: verified.claims.action,
                actor_code,
                role: verified.claims.role,
                comment,
            },
        )
        .await
    }
}
