//! Integration tests for the connection graph: request/respond state
//! machine, pair uniqueness, and connection-gated messaging.

use std::sync::Arc;

use nexusd::config::DaemonConfig;
use nexusd::connections::{ConnectionDecision, ConnectionFilter, RelationshipKind};
use nexusd::directory::Registration;
use nexusd::error::WorkflowError;
use nexusd::guard::{Identity, Role};
use nexusd::storage::Storage;
use nexusd::AppContext;

async fn test_ctx() -> Arc<AppContext> {
    let data_dir = tempfile::tempdir().unwrap().keep();
    let config = Arc::new(DaemonConfig::new(None, Some(data_dir.clone()), None, None));
    let storage = Arc::new(Storage::new(&data_dir).await.unwrap());
    AppContext::build(config, storage)
}

async fn active_company(ctx: &AppContext, name: &str) -> (String, Identity) {
    let (company, manager) = ctx
        .directory
        .register(Registration {
            name: name.to_string(),
            sector: "logistics".to_string(),
            kind: "hybrid".to_string(),
            manager_email: format!("boss@{}.example", name.to_lowercase()),
            manager_password: "correct-horse".to_string(),
        })
        .await
        .unwrap();
    assert!(ctx
        .storage
        .transition_company_status(&company.id, "pending", "active")
        .await
        .unwrap());
    let identity = Identity {
        user_id: manager.id,
        email: manager.email,
        role: Role::Manager,
        company_id: Some(company.id.clone()),
        company_status: Some("active".to_string()),
    };
    (company.id, identity)
}

// ─── Request ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cannot_connect_to_self() {
    let ctx = test_ctx().await;
    let (a_id, a) = active_company(&ctx, "Alpha").await;
    let err = ctx
        .connections
        .request(&a, &a_id, RelationshipKind::Partner)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTarget(_)));
}

#[tokio::test]
async fn duplicate_pending_or_active_relationship_rejected() {
    let ctx = test_ctx().await;
    let (b_id, a) = {
        let (_a_id, a) = active_company(&ctx, "Alpha").await;
        let (b_id, _b) = active_company(&ctx, "Beta").await;
        (b_id, a)
    };

    ctx.connections
        .request(&a, &b_id, RelationshipKind::Supplier)
        .await
        .unwrap();

    // Same kind, same pair, still pending — refused.
    let err = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Supplier)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateRelationship));

    // A different kind between the same pair is a separate edge.
    ctx.connections
        .request(&a, &b_id, RelationshipKind::Partner)
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_check_is_direction_agnostic() {
    let ctx = test_ctx().await;
    let (a_id, a) = active_company(&ctx, "Alpha").await;
    let (b_id, b) = active_company(&ctx, "Beta").await;

    ctx.connections
        .request(&a, &b_id, RelationshipKind::Client)
        .await
        .unwrap();
    // The reverse direction still collides on the unordered pair.
    let err = ctx
        .connections
        .request(&b, &a_id, RelationshipKind::Client)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateRelationship));
}

// ─── Respond ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_target_company_may_respond() {
    let ctx = test_ctx().await;
    let (_a_id, a) = active_company(&ctx, "Alpha").await;
    let (b_id, b) = active_company(&ctx, "Beta").await;
    let (_c_id, c) = active_company(&ctx, "Gamma").await;

    let rel = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Supplier)
        .await
        .unwrap();

    // Neither the initiator nor a bystander may respond.
    for outsider in [&a, &c] {
        let err = ctx
            .connections
            .respond(outsider, &rel.id, ConnectionDecision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized(_)));
    }

    let row = ctx
        .connections
        .respond(&b, &rel.id, ConnectionDecision::Accept)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "active");

    // pending → active happened; a second response is an invalid transition.
    let err = ctx
        .connections
        .respond(&b, &rel.id, ConnectionDecision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));
}

#[tokio::test]
async fn reject_removes_the_request_and_frees_the_pair() {
    let ctx = test_ctx().await;
    let (_a_id, a) = active_company(&ctx, "Alpha").await;
    let (b_id, b) = active_company(&ctx, "Beta").await;

    let rel = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Distributor)
        .await
        .unwrap();
    let removed = ctx
        .connections
        .respond(&b, &rel.id, ConnectionDecision::Reject)
        .await
        .unwrap();
    assert!(removed.is_none());
    assert!(ctx.storage.get_relationship(&rel.id).await.unwrap().is_none());

    // After a terminal removal the pair may try again.
    ctx.connections
        .request(&a, &b_id, RelationshipKind::Distributor)
        .await
        .unwrap();
}

// ─── Disconnect ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn either_party_disconnects_active_strangers_cannot() {
    let ctx = test_ctx().await;
    let (_a_id, a) = active_company(&ctx, "Alpha").await;
    let (b_id, b) = active_company(&ctx, "Beta").await;
    let (_c_id, c) = active_company(&ctx, "Gamma").await;

    let rel = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Partner)
        .await
        .unwrap();

    // Disconnect before acceptance is an invalid transition.
    let err = ctx.connections.disconnect(&a, &rel.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    ctx.connections
        .respond(&b, &rel.id, ConnectionDecision::Accept)
        .await
        .unwrap();

    let err = ctx.connections.disconnect(&c, &rel.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthorized(_)));

    ctx.connections.disconnect(&a, &rel.id).await.unwrap();
    assert!(ctx.storage.get_relationship(&rel.id).await.unwrap().is_none());
}

// ─── Listing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_by_kind_and_status() {
    let ctx = test_ctx().await;
    let (a_id, a) = active_company(&ctx, "Alpha").await;
    let (b_id, b) = active_company(&ctx, "Beta").await;
    let (c_id, _c) = active_company(&ctx, "Gamma").await;

    let supplier_rel = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Supplier)
        .await
        .unwrap();
    ctx.connections
        .respond(&b, &supplier_rel.id, ConnectionDecision::Accept)
        .await
        .unwrap();
    ctx.connections
        .request(&a, &c_id, RelationshipKind::Partner)
        .await
        .unwrap();

    let all = ctx
        .connections
        .list(&a, &a_id, ConnectionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let active_only = ctx
        .connections
        .list(
            &a,
            &a_id,
            ConnectionFilter {
                kind: None,
                status: Some("active".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].kind, "supplier");

    // A company cannot read someone else's connection list.
    let err = ctx
        .connections
        .list(&b, &c_id, ConnectionFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

// ─── Standing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn suspended_company_cannot_open_connections() {
    let ctx = test_ctx().await;
    let (a_id, mut a) = active_company(&ctx, "Alpha").await;
    let (b_id, _b) = active_company(&ctx, "Beta").await;

    assert!(ctx
        .storage
        .transition_company_status(&a_id, "active", "suspended")
        .await
        .unwrap());
    a.company_status = Some("suspended".to_string());

    let err = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Supplier)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

// ─── Messaging rides the graph ───────────────────────────────────────────────

#[tokio::test]
async fn messaging_requires_an_active_connection() {
    let ctx = test_ctx().await;
    let (a_id, a) = active_company(&ctx, "Alpha").await;
    let (b_id, b) = active_company(&ctx, "Beta").await;

    let err = ctx.mailbox.send(&a, &b_id, "hello?").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let rel = ctx
        .connections
        .request(&a, &b_id, RelationshipKind::Partner)
        .await
        .unwrap();
    ctx.connections
        .respond(&b, &rel.id, ConnectionDecision::Accept)
        .await
        .unwrap();

    ctx.mailbox.send(&a, &b_id, "hello partner").await.unwrap();
    ctx.mailbox.send(&b, &a_id, "hello back").await.unwrap();

    let thread = ctx
        .mailbox
        .thread(&a, &a_id, &b_id, None, None)
        .await
        .unwrap();
    assert_eq!(thread.len(), 2);
    // Newest first.
    assert_eq!(thread[0].body, "hello back");

    // Empty bodies never leave the validation gate.
    let err = ctx.mailbox.send(&a, &b_id, "   ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    // Outsiders cannot read the thread.
    let (_c_id, c) = active_company(&ctx, "Gamma").await;
    let err = ctx
        .mailbox
        .thread(&c, &a_id, &b_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}
