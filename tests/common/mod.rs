//! Shared fixtures for the integration suite: a seeded reporting hierarchy
//! and approver configuration, plus engine constructors.
#![allow(dead_code)]

use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use approval_flow::{
    CreateWorkflow, EngineConfig, ScopeMode, WorkflowEngine, WorkflowType,
};

pub const MR1: &str = "MR1";
pub const MR2: &str = "MR2";
pub const DSM1: &str = "DSM1";
pub const RSM1: &str = "RSM1";
pub const BISO1A: &str = "BISO1A";
pub const BISO2A: &str = "BISO2A";
pub const CD1: &str = "CD1";
pub const RSD1: &str = "RSD1";

pub fn engine(pool: PgPool) -> WorkflowEngine {
    engine_with_mode(pool, ScopeMode::Permissive)
}

pub fn engine_with_mode(pool: PgPool, scope_mode: ScopeMode) -> WorkflowEngine {
    WorkflowEngine::new(
        pool,
        EngineConfig {
            scope_mode,
            shortlink_key: "integration-test-key".to_string(),
            shortlink_ttl: Duration::from_secs(600),
        },
    )
}

/// Hierarchy: MR1 owns H001/H002 and MR2 owns H003, all under DSM1 who
/// reports to RSM1.
pub async fn seed_hierarchy(pool: &PgPool) -> sqlx::Result<()> {
    for (hospital, mr) in [("H001", MR1), ("H002", MR1), ("H003", MR2)] {
        sqlx::query(
            r#"
            INSERT INTO hospital_assignments (hospital_code, mr_code, dsm_code, rsm_code)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(hospital)
        .bind(mr)
        .bind(DSM1)
        .bind(RSM1)
        .execute(pool)
        .await?;
    }

    for (code, role, email) in [
        (MR1, "MR", "mr1@example.com"),
        (MR2, "MR", "mr2@example.com"),
        (DSM1, "DSM", "dsm1@example.com"),
        (RSM1, "RSM", "rsm1@example.com"),
        (CD1, "CD", "cd1@example.com"),
    ] {
        sqlx::query(
            r#"
            INSERT INTO user_mappings (actor_code, actor_role, name, email, enabled)
            VALUES ($1, $2, $1, $3, TRUE)
            "#,
        )
        .bind(code)
        .bind(role)
        .bind(email)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Pin every configured role for `workflow_type` to a fixed approver.
pub async fn seed_approvers(pool: &PgPool, workflow_type: WorkflowType) -> sqlx::Result<()> {
    for (role, actor) in [
        ("BISO1", BISO1A),
        ("BISO2", BISO2A),
        ("CD", CD1),
        ("RSD", RSD1),
    ] {
        sqlx::query(
            r#"
            INSERT INTO approver_configs (id, workflow_type, role, actor_code, enabled)
            VALUES ($1, $2, $3, $4, TRUE)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_type.as_str())
        .bind(role)
        .bind(actor)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub fn new_target_hospital_request(submitted_by: &str) -> CreateWorkflow {
    CreateWorkflow {
        workflow_type: WorkflowType::NewTargetHospital,
        payload: json!({ "hospitalCode": "H001", "hospitalName": "City General" }),
        title: Some("add target hospital H001".to_string()),
        submitted_by: Some(submitted_by.to_string()),
    }
}

pub fn cancel_link_pharmacy_request(submitted_by: &str) -> CreateWorkflow {
    CreateWorkflow {
        workflow_type: WorkflowType::CancelLinkPharmacy,
        payload: json!({ "pharmacyCode": "P100" }),
        title: Some("drop linked pharmacy P100".to_string()),
        submitted_by: Some(submitted_by.to_string()),
    }
}

pub fn cancel_target_hospital_request(
    submitted_by: &str,
    targets: &[(&str, f64)],
) -> CreateWorkflow {
    let distributions: Vec<serde_json::Value> = targets
        .iter()
        .map(|(code, percent)| json!({ "targetHospitalCode": code, "percent": percent }))
        .collect();
    CreateWorkflow {
        workflow_type: WorkflowType::CancelTargetHospital,
        payload: json!({ "hospitalCode": "H001", "distributions": distributions }),
        title: Some("cancel target hospital H001".to_string()),
        submitted_by: Some(submitted_by.to_string()),
    }
}
