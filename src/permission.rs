//! Role x Type Permission Matrix
//!
//! Which actions a role may perform on a given workflow type, independent of
//! workflow status. Both this matrix and the state machine must pass before
//! an action is applied.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{WorkflowAction, WorkflowRole, WorkflowType};

const SUBMIT_WITHDRAW: &[WorkflowAction] = &[WorkflowAction::Submit, WorkflowAction::Withdraw];

/// Intermediate management roles: may originate requests and act on steps
const FULL: &[WorkflowAction] = &[
    WorkflowAction::Submit,
    WorkflowAction::Withdraw,
    WorkflowAction::Approve,
    WorkflowAction::Reject,
    WorkflowAction::Return,
];

/// Terminal approval roles: decide, never originate
const APPROVE_REJECT: &[WorkflowAction] = &[WorkflowAction::Approve, WorkflowAction::Reject];

type PermissionKey = (WorkflowType, WorkflowRole);

static PERMISSIONS: LazyLock<HashMap<PermissionKey, &'static [WorkflowAction]>> =
    LazyLock::new(|| {
        use WorkflowRole::*;
        use WorkflowType::*;

        let mut m: HashMap<PermissionKey, &'static [WorkflowAction]> = HashMap::new();

        for ty in [
            NewTargetHospital,
            CancelTargetHospital,
            NewLinkPharmacy,
            CancelLinkPharmacy,
        ] {
            m.insert((ty, Mr), SUBMIT_WITHDRAW);
            m.insert((ty, Dsm), FULL);
            m.insert((ty, Rsm), FULL);
            m.insert((ty, Biso1), APPROVE_REJECT);
            m.insert((ty, Biso2), APPROVE_REJECT);
            m.insert((ty, Rsd), APPROVE_REJECT);
        }
        // CD sits in the chain only for new-target-hospital and (conditionally)
        // new-linked-pharmacy
        m.insert((NewTargetHospital, Cd), APPROVE_REJECT);
        m.insert((NewLinkPharmacy, Cd), APPROVE_REJECT);

        // Region adjustments originate at DSM level, MRs are not involved
        m.insert((RegionAdjustment, Dsm), SUBMIT_WITHDRAW);
        m.insert((RegionAdjustment, Rsm), FULL);
        m.insert((RegionAdjustment, Biso1), APPROVE_REJECT);
        m.insert((RegionAdjustment, Biso2), APPROVE_REJECT);
        m.insert((RegionAdjustment, Rsd), APPROVE_REJECT);

        m
    });

/// Actions `role` may perform on workflows of `workflow_type`; empty when the
/// matrix has no entry for the pair
pub fn allowed_actions(workflow_type: WorkflowType, role: WorkflowRole) -> &'static [WorkflowAction] {
    PERMISSIONS
        .get(&(workflow_type, role))
        .copied()
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn originating_role_may_only_submit_and_withdraw() {
        let actions = allowed_actions(WorkflowType::NewTargetHospital, WorkflowRole::Mr);
        assert_eq!(actions, SUBMIT_WITHDRAW);
        assert!(!actions.contains(&WorkflowAction::Approve));
    }

    #[test]
    fn management_roles_hold_the_full_set() {
        for role in [WorkflowRole::Dsm, WorkflowRole::Rsm] {
            let actions = allowed_actions(WorkflowType::CancelLinkPharmacy, role);
            assert!(actions.contains(&WorkflowAction::Approve));
            assert!(actions.contains(&WorkflowAction::Return));
            assert!(actions.contains(&WorkflowAction::Submit));
        }
    }

    #[test]
    fn terminal_roles_cannot_submit() {
        for role in [WorkflowRole::Biso1, WorkflowRole::Biso2, WorkflowRole::Rsd] {
            let actions = allowed_actions(WorkflowType::RegionAdjustment, role);
            assert_eq!(actions, APPROVE_REJECT);
        }
    }

    #[test]
    fn absent_entries_yield_empty_set() {
        assert!(allowed_actions(WorkflowType::RegionAdjustment, WorkflowRole::Mr).is_empty());
        assert!(allowed_actions(WorkflowType::CancelTargetHospital, WorkflowRole::Cd).is_empty());
    }
}
