//! Payload Validation
//!
//! Type-specific structural invariants on the request form payload.
//! Only cancel-target-hospital carries a non-trivial rule today: the
//! reassignment distributions must name a target hospital each, use positive
//! percentages, and sum to exactly 100.

use crate::error::WorkflowError;
use crate::types::WorkflowType;

const PERCENT_EPSILON: f64 = 1e-4;

fn validate_cancel_target_hospital(payload: &serde_json::Value) -> Result<(), WorkflowError> {
    let distributions = payload
        .get("distributions")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            WorkflowError::Validation(
                "cancel-target-hospital requires a non-empty distributions list".to_string(),
            )
        })?;

    let mut total = 0.0_f64;
    for item in distributions {
        let hospital = item
            .get("targetHospitalCode")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                WorkflowError::Validation(
                    "distribution entry is missing targetHospitalCode".to_string(),
                )
            })?;

        // Two synonymous field names are in circulation
        let percent = item
            .get("percent")
            .or_else(|| item.get("sharePercent"))
            .and_then(|v| v.as_f64());
        match percent {
            Some(p) if p > 0.0 => total += p,
            _ => {
                return Err(WorkflowError::Validation(format!(
                    "distribution percentage must be positive for hospital {hospital}"
                )))
            }
        }
    }

    if (total - 100.0).abs() > PERCENT_EPSILON {
        return Err(WorkflowError::Validation(format!(
            "distribution percentages must sum to 100, got {total}"
        )));
    }
    Ok(())
}

/// Enforce type-specific payload invariants; all other types pass unchecked
/// at this layer.
pub fn validate_payload(
    workflow_type: WorkflowType,
    payload: &serde_json::Value,
) -> Result<(), WorkflowError> {
    match workflow_type {
        WorkflowType::CancelTargetHospital => validate_cancel_target_hospital(payload),
        _ => Ok(()),
    }
}

/// Target hospital codes named in a cancel-target-hospital payload, in
/// payload order. Empty for other shapes.
pub fn distribution_hospitals(payload: &serde_json::Value) -> Vec<String> {
    payload
        .get("distributions")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|d| d.get("targetHospitalCode").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Primary hospital code carried by a payload, accepting both field
/// spellings seen in submitted forms.
pub fn payload_hospital_code(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("hospitalCode")
        .or_else(|| payload.get("hospital_code"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
