//! Workflow State Machine
//!
//! Fixed table of legal (status, action) pairs. Pure and total: unknown
//! pairs are simply illegal, terminal statuses admit nothing.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{WorkflowAction, WorkflowStatus};

static TRANSITIONS: LazyLock<HashMap<WorkflowStatus, &'static [WorkflowAction]>> =
    LazyLock::new(|| {
        HashMap::from([
            (
                WorkflowStatus::Draft,
                &[WorkflowAction::Submit, WorkflowAction::Withdraw][..],
            ),
            (
                WorkflowStatus::InProgress,
                &[
                    WorkflowAction::Approve,
                    WorkflowAction::Reject,
                    WorkflowAction::Return,
                    WorkflowAction::Withdraw,
                ][..],
            ),
            (WorkflowStatus::Approved, &[][..]),
            (WorkflowStatus::Rejected, &[][..]),
        ])
    });

/// Whether `action` is legal from `status`
pub fn can_transition(status: WorkflowStatus, action: WorkflowAction) -> bool {
    TRANSITIONS
        .get(&status)
        .map(|actions| actions.contains(&action))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_allowed_from_draft() {
        assert!(can_transition(WorkflowStatus::Draft, WorkflowAction::Submit));
        assert!(can_transition(
            WorkflowStatus::Draft,
            WorkflowAction::Withdraw
        ));
    }

    #[test]
    fn approval_actions_only_in_progress() {
        assert!(can_transition(
            WorkflowStatus::InProgress,
            WorkflowAction::Approve
        ));
        assert!(can_transition(
            WorkflowStatus::InProgress,
            WorkflowAction::Return
        ));
        assert!(!can_transition(
            WorkflowStatus::Draft,
            WorkflowAction::Approve
        ));
    }

    #[test]
    fn terminal_statuses_admit_nothing() {
        for action in [
            WorkflowAction::Submit,
            WorkflowAction::Approve,
            WorkflowAction::Reject,
            WorkflowAction::Return,
            WorkflowAction::Withdraw,
        ] {
            assert!(!can_transition(WorkflowStatus::Approved, action));
            assert!(!can_transition(WorkflowStatus::Rejected, action));
        }
    }

    #[test]
    fn table_covers_every_status() {
        for status in [
            WorkflowStatus::Draft,
            WorkflowStatus::InProgress,
            WorkflowStatus::Approved,
            WorkflowStatus::Rejected,
        ] {
            assert!(TRANSITIONS.contains_key(&status));
        }
    }
}
