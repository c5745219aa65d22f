//! Approval Chain Builder
//!
//! Produces the ordered list of required approval steps for a workflow type.
//! Templates are static; the one dynamic rule is the compliance (CD) step
//! spliced into new-linked-pharmacy chains for externally sourced class-A
//! pharmacies. Pure function, deterministic for identical inputs.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{WorkflowRole, WorkflowType};

/// A chain position before persistence: dense 1-based sequence plus role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDef {
    pub sequence: i32,
    pub role: WorkflowRole,
}

static CHAINS: LazyLock<HashMap<WorkflowType, &'static [WorkflowRole]>> = LazyLock::new(|| {
    use WorkflowRole::*;
    use WorkflowType::*;

    HashMap::from([
        (
            NewTargetHospital,
            &[Dsm, Rsm, Biso1, Biso2, Cd, Rsd][..],
        ),
        (CancelTargetHospital, &[Dsm, Rsm, Biso1, Biso2, Rsd][..]),
        // CD spliced in before BISO1 when the payload requires it
        (NewLinkPharmacy, &[Dsm, Rsm, Biso1, Biso2, Rsd][..]),
        (CancelLinkPharmacy, &[Dsm, Rsm, Biso1, Biso2, Rsd][..]),
        (RegionAdjustment, &[Rsm, Biso1, Biso2, Rsd][..]),
    ])
});

/// Whether a new-linked-pharmacy payload triggers the extra compliance step:
/// externally sourced ("other" pharmacy) and classified class A, or an
/// explicit `requireCD` override.
fn needs_cd_step(payload: &serde_json::Value) -> bool {
    if payload.get("requireCD").and_then(|v| v.as_bool()) == Some(true) {
        return true;
    }
    let is_other = payload.get("isOther").and_then(|v| v.as_bool()) == Some(true)
        || payload.get("pharmacySource").and_then(|v| v.as_str()) == Some("其他");
    let is_a_class = matches!(
        payload.get("pharmacyType").and_then(|v| v.as_str()),
        Some("A类") | Some("A") | Some("A_CLASS")
    );
    is_other && is_a_class
}

/// Build the ordered approval chain for `workflow_type` given its payload.
///
/// Sequences come out dense and ascending from 1, also after the conditional
/// splice, so fractional or colliding values never reach persisted state.
pub fn build_steps(workflow_type: WorkflowType, payload: &serde_json::Value) -> Vec<StepDef> {
    let template = CHAINS.get(&workflow_type).copied().unwrap_or(&[]);
    let mut roles: Vec<WorkflowRole> = template.to_vec();

    if workflow_type == WorkflowType::NewLinkPharmacy && needs_cd_step(payload) {
        let insert_at = roles
            .iter()
            .position(|r| *r == WorkflowRole::Biso1)
            .unwrap_or(roles.len());
        roles.insert(insert_at, WorkflowRole::Cd);
    }

    roles
        .into_iter()
        .enumerate()
        .map(|(idx, role)| StepDef {
            sequence: idx as i32 + 1,
            role,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roles(steps: &[StepDef]) -> Vec<WorkflowRole> {
        steps.iter().map(|s| s.role).collect()
    }

    fn assert_dense(steps: &[StepDef]) {
        for (idx, step) in steps.iter().enumerate() {
            assert_eq!(step.sequence, idx as i32 + 1);
        }
    }

    #[test]
    fn default_chain_for_new_target_hospital() {
        let steps = build_steps(WorkflowType::NewTargetHospital, &json!({}));
        assert_eq!(
            roles(&steps),
            vec![
                WorkflowRole::Dsm,
                WorkflowRole::Rsm,
                WorkflowRole::Biso1,
                WorkflowRole::Biso2,
                WorkflowRole::Cd,
                WorkflowRole::Rsd,
            ]
        );
        assert_dense(&steps);
    }

    #[test]
    fn cd_spliced_for_other_a_class_pharmacy() {
        let steps = build_steps(
            WorkflowType::NewLinkPharmacy,
            &json!({ "pharmacySource": "其他", "pharmacyType": "A类" }),
        );
        assert_eq!(
            roles(&steps),
            vec![
                WorkflowRole::Dsm,
                WorkflowRole::Rsm,
                WorkflowRole::Cd,
                WorkflowRole::Biso1,
                WorkflowRole::Biso2,
                WorkflowRole::Rsd,
            ]
        );
        assert_dense(&steps);
    }

    #[test]
    fn explicit_override_also_splices_cd() {
        let steps = build_steps(WorkflowType::NewLinkPharmacy, &json!({ "requireCD": true }));
        assert!(roles(&steps).contains(&WorkflowRole::Cd));
        assert_dense(&steps);
    }

    #[test]
    fn no_cd_without_trigger() {
        let steps = build_steps(
            WorkflowType::NewLinkPharmacy,
            &json!({ "pharmacySource": "其他", "pharmacyType": "B" }),
        );
        assert!(!roles(&steps).contains(&WorkflowRole::Cd));
        assert_dense(&steps);

        let steps = build_steps(
            WorkflowType::NewLinkPharmacy,
            &json!({ "isOther": false, "pharmacyType": "A" }),
        );
        assert!(!roles(&steps).contains(&WorkflowRole::Cd));
    }

    #[test]
    fn splice_preserves_relative_order() {
        let base = build_steps(WorkflowType::NewLinkPharmacy, &json!({}));
        let spliced = build_steps(
            WorkflowType::NewLinkPharmacy,
            &json!({ "isOther": true, "pharmacyType": "A_CLASS" }),
        );
        let without_cd: Vec<WorkflowRole> = roles(&spliced)
            .into_iter()
            .filter(|r| *r != WorkflowRole::Cd)
            .collect();
        assert_eq!(without_cd, roles(&base));
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let payload = json!({ "isOther": true, "pharmacyType": "A" });
        let a = build_steps(WorkflowType::NewLinkPharmacy, &payload);
        let b = build_steps(WorkflowType::NewLinkPharmacy, &payload);
        assert_eq!(a, b);
    }
}
