//! Error taxonomy for the approval workflow engine
//!
//! Callers map these onto transport responses: `Validation` and
//! `InvalidTransition` are bad requests, `Authorization` is forbidden,
//! `NotFound` is missing, and `Conflict` is retryable. Audit-sink failures
//! are never surfaced through this type.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{WorkflowAction, WorkflowStatus};

/// Errors surfaced by the workflow engine and its collaborators
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Malformed or incomplete input, payload invariant violation, or a
    /// missing prerequisite such as a required attachment
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested action is not legal from the workflow's current status
    #[error("action {action} not allowed from status {status}")]
    InvalidTransition {
        status: WorkflowStatus,
        action: WorkflowAction,
    },

    /// An approval action was attempted but no step is awaiting approval
    #[error("no step is awaiting approval")]
    NoCurrentStep,

    /// Role/permission mismatch, scope violation, or visibility denial
    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("workflow {0} not found")]
    NotFound(Uuid),

    /// Lost a race against a concurrent mutation; safe to retry once
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    /// Classify a sqlx error from a locking read: Postgres 55P03
    /// (lock_not_available, from FOR UPDATE NOWAIT) and 40001
    /// (serialization_failure) become `Conflict`, everything else passes
    /// through as `Database`.
    pub fn from_locking(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if let Some(code) = db_err.code() {
                if code == "55P03" || code == "40001" {
                    return Self::Conflict(db_err.message().to_string());
                }
            }
        }
        Self::Database(err)
    }
}
