//! Guard coverage: permission matrix enforcement, scope checks under both
//! modes, visibility rules, draft-only deletion, and lock-conflict
//! signalling.

mod common;

use approval_flow::{
    ActionRequest, WorkflowAction, WorkflowError, WorkflowFilter, WorkflowRole, WorkflowStatus,
    WorkflowType,
};
use sqlx::PgPool;

use common::*;

fn as_role(action: WorkflowAction, actor: &str, role: WorkflowRole) -> ActionRequest {
    ActionRequest {
        action,
        actor_code: Some(actor.to_string()),
        role: Some(role),
        comment: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn representative_cannot_approve(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;
    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;

    let err = engine
        .act(id, as_role(WorkflowAction::Approve, MR1, WorkflowRole::Mr))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn approval_requires_current_step_role(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;
    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;

    // RSM is in the chain but the DSM step is the one in progress
    let err = engine
        .act(id, as_role(WorkflowAction::Approve, RSM1, WorkflowRole::Rsm))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn role_without_actor_is_rejected(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let err = engine
        .act(
            detail.workflow.id,
            ActionRequest {
                action: WorkflowAction::Submit,
                actor_code: None,
                role: Some(WorkflowRole::Mr),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn only_submitter_may_submit_or_withdraw(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;

    let err = engine
        .act(id, as_role(WorkflowAction::Submit, MR2, WorkflowRole::Mr))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));

    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;
    let err = engine
        .act(id, as_role(WorkflowAction::Withdraw, MR2, WorkflowRole::Mr))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn reassignment_outside_submitter_scope_names_hospitals(
    pool: PgPool,
) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelTargetHospital).await?;
    let engine = engine(pool);

    // MR1 owns H001 and H002; H003 belongs to MR2
    let err = engine
        .create(cancel_target_hospital_request(
            MR1,
            &[("H002", 60.0), ("H003", 40.0)],
        ))
        .await
        .unwrap_err();
    match err {
        WorkflowError::Authorization(msg) => {
            assert!(msg.contains("H003"), "offending code missing: {msg}");
            assert!(!msg.contains("H002"), "in-scope code flagged: {msg}");
        }
        other => panic!("expected authorization error, got {other:?}"),
    }

    // Entirely in-scope reassignment goes through
    let detail = engine
        .create(cancel_target_hospital_request(MR1, &[("H002", 100.0)]))
        .await?;
    assert_eq!(detail.workflow.status, WorkflowStatus::Draft);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn reassignment_requires_submitter_scope_in_every_mode(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelTargetHospital).await?;

    // "GHOST" has no hierarchy rows; even permissive mode refuses a
    // reassignment from an actor with nothing to reassign
    let engine = engine(pool);
    let err = engine
        .create(cancel_target_hospital_request("GHOST", &[("H001", 100.0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_scope_restricts_only_in_strict_mode(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::NewTargetHospital).await?;

    // "GHOST" has no hierarchy rows at all
    let permissive = engine(pool.clone());
    let detail = permissive
        .create(new_target_hospital_request("GHOST"))
        .await?;
    assert_eq!(detail.workflow.status, WorkflowStatus::Draft);

    let strict = engine_with_mode(pool, approval_flow::ScopeMode::Strict);
    let err = strict
        .create(new_target_hospital_request("GHOST"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn drafts_visible_only_to_submitter(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;

    assert!(engine.find_one(id, Some(MR1)).await.is_ok());
    let err = engine.find_one(id, Some(MR2)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));

    // Once in progress the current assignee may see it, other actors not
    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;
    assert!(engine.find_one(id, Some(DSM1)).await.is_ok());
    assert!(engine.find_one(id, Some(MR1)).await.is_ok());
    let err = engine.find_one(id, Some(MR2)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn list_restricts_to_participants(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;
    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;

    let for_actor = |actor: &str| WorkflowFilter {
        actor_code: Some(actor.to_string()),
        ..Default::default()
    };
    assert_eq!(engine.list(&for_actor(MR1)).await?.len(), 1);
    assert_eq!(engine.list(&for_actor(DSM1)).await?.len(), 1);
    assert!(engine.list(&for_actor(MR2)).await?.is_empty());

    // Status filter composes with the actor restriction
    let filter = WorkflowFilter {
        actor_code: Some(MR1.to_string()),
        status: Some(WorkflowStatus::Draft),
        ..Default::default()
    };
    assert!(engine.list(&filter).await?.is_empty());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn only_draft_workflows_can_be_deleted(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;

    let err = engine.remove(id, Some(MR2)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization(_)));

    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;
    let err = engine.remove(id, Some(MR1)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    engine
        .act(id, as_role(WorkflowAction::Withdraw, MR1, WorkflowRole::Mr))
        .await?;
    engine.remove(id, Some(MR1)).await?;
    let err = engine.find_one(id, None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn compliance_approval_requires_attachment(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::NewLinkPharmacy).await?;
    let engine = engine(pool);

    let detail = engine
        .create(approval_flow::CreateWorkflow {
            workflow_type: WorkflowType::NewLinkPharmacy,
            payload: serde_json::json!({ "pharmacyCode": "P300", "requireCD": true }),
            title: None,
            submitted_by: Some(MR1.to_string()),
        })
        .await?;
    let id = detail.workflow.id;

    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;
    engine
        .act(id, as_role(WorkflowAction::Approve, DSM1, WorkflowRole::Dsm))
        .await?;
    let detail = engine
        .act(id, as_role(WorkflowAction::Approve, RSM1, WorkflowRole::Rsm))
        .await?;
    assert_eq!(
        detail.current_step().map(|s| s.role),
        Some(WorkflowRole::Cd)
    );

    let err = engine
        .act(id, as_role(WorkflowAction::Approve, CD1, WorkflowRole::Cd))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    engine
        .add_attachment(id, None, "compliance-review.pdf", None, None)
        .await?;
    let detail = engine
        .act(id, as_role(WorkflowAction::Approve, CD1, WorkflowRole::Cd))
        .await?;
    assert_eq!(
        detail.current_step().map(|s| s.role),
        Some(WorkflowRole::Biso1)
    );
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_action_fails_fast_with_conflict(pool: PgPool) -> anyhow::Result<()> {
    seed_hierarchy(&pool).await?;
    seed_approvers(&pool, WorkflowType::CancelLinkPharmacy).await?;
    let engine = engine(pool.clone());

    let detail = engine.create(cancel_link_pharmacy_request(MR1)).await?;
    let id = detail.workflow.id;
    engine
        .act(id, as_role(WorkflowAction::Submit, MR1, WorkflowRole::Mr))
        .await?;

    // Hold the workflow row lock the way a racing act() would
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT id FROM workflows WHERE id = $1 FOR UPDATE")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let err = engine
        .act(id, as_role(WorkflowAction::Approve, DSM1, WorkflowRole::Dsm))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));
    tx.rollback().await?;

    // With the lock released the same action succeeds
    let detail = engine
        .act(id, as_role(WorkflowAction::Approve, DSM1, WorkflowRole::Dsm))
        .await?;
    assert_eq!(
        detail.current_step().map(|s| s.role),
        Some(WorkflowRole::Rsm)
    );
    Ok(())
}
