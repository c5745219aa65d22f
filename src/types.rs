//! Core Domain Types
//!
//! Enumerations and records for approval workflows. Enum values are stored
//! as TEXT in Postgres and use the same wire spelling in JSON payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of approval request moving through the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    NewTargetHospital,
    CancelTargetHospital,
    NewLinkPharmacy,
    CancelLinkPharmacy,
    RegionAdjustment,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewTargetHospital => "NEW_TARGET_HOSPITAL",
            Self::CancelTargetHospital => "CANCEL_TARGET_HOSPITAL",
            Self::NewLinkPharmacy => "NEW_LINK_PHARMACY",
            Self::CancelLinkPharmacy => "CANCEL_LINK_PHARMACY",
            Self::RegionAdjustment => "REGION_ADJUSTMENT",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a workflow, also reused for the per-step status column.
///
/// Steps start in `Draft` and move to `InProgress` when activated; a step is
/// never `Draft` while an earlier step is still unapproved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Draft,
    InProgress,
    Approved,
    Rejected,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::InProgress => "IN_PROGRESS",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action applied to a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    Submit,
    Approve,
    Reject,
    Return,
    Withdraw,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "SUBMIT",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Return => "RETURN",
            Self::Withdraw => "WITHDRAW",
        }
    }

    /// Actions that operate on the currently active step
    pub fn requires_current_step(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject | Self::Return)
    }
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Organizational role bound to a step or an acting identity.
///
/// MR/DSM/RSM assignees are derived from the hospital assignment hierarchy;
/// BISO1/BISO2/CD/RSD are resolved from approver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowRole {
    Mr,
    Dsm,
    Rsm,
    Biso1,
    Biso2,
    Cd,
    Rsd,
}

impl WorkflowRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mr => "MR",
            Self::Dsm => "DSM",
            Self::Rsm => "RSM",
            Self::Biso1 => "BISO1",
            Self::Biso2 => "BISO2",
            Self::Cd => "CD",
            Self::Rsd => "RSD",
        }
    }

    /// Roles whose assignee comes from approver configuration rather than
    /// the reporting hierarchy
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Biso1 | Self::Biso2 | Self::Cd | Self::Rsd)
    }
}

impl std::fmt::Display for WorkflowRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One approval request and its lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    pub title: String,
    /// Form payload; shape depends on `workflow_type`
    pub payload: serde_json::Value,
    /// Initiator's actor code, immutable once set
    pub submitted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One position in a workflow's ordered approval chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Execution order, dense positive integers starting at 1
    pub sequence: i32,
    pub role: WorkflowRole,
    pub status: WorkflowStatus,
    /// Actor code expected to act on this step, resolved lazily for
    /// hierarchy roles
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of an applied action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowActionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub action: WorkflowAction,
    pub actor_code: Option<String>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata; binary content lives outside this system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_id: Option<Uuid>,
    pub filename: String,
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Static approver mapping for configured roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproverConfig {
    pub id: Uuid,
    pub workflow_type: WorkflowType,
    pub role: WorkflowRole,
    /// Fixed assignee; takes precedence over `email`
    pub actor_code: Option<String>,
    /// Resolved to an actor code through the user directory when set
    pub email: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directory entry for a field representative, used by delegation pickers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Representative {
    pub actor_code: String,
    pub actor_role: WorkflowRole,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A workflow with its child rows, as returned by detail and export queries
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub steps: Vec<WorkflowStep>,
    pub actions: Vec<WorkflowActionRecord>,
    pub attachments: Vec<Attachment>,
}

impl WorkflowDetail {
    /// The step currently awaiting approval, if the chain has started
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .find(|s| s.status == WorkflowStatus::InProgress)
    }
}
