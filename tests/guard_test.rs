//! Integration tests for the access guard: credential resolution, role
//! gating, and membership checks.

use std::sync::Arc;

use nexusd::config::DaemonConfig;
use nexusd::directory::Registration;
use nexusd::error::WorkflowError;
use nexusd::guard::{self, Role};
use nexusd::storage::Storage;
use nexusd::AppContext;

async fn test_ctx() -> Arc<AppContext> {
    let data_dir = tempfile::tempdir().unwrap().keep();
    let config = Arc::new(DaemonConfig::new(None, Some(data_dir.clone()), None, None));
    let storage = Arc::new(Storage::new(&data_dir).await.unwrap());
    AppContext::build(config, storage)
}

async fn register_active(ctx: &AppContext, name: &str, email: &str) -> String {
    let (company, _manager) = ctx
        .directory
        .register(Registration {
            name: name.to_string(),
            sector: "chemicals".to_string(),
            kind: "supplier".to_string(),
            manager_email: email.to_string(),
            manager_password: "correct-horse".to_string(),
        })
        .await
        .unwrap();
    assert!(ctx
        .storage
        .transition_company_status(&company.id, "pending", "active")
        .await
        .unwrap());
    company.id
}

#[tokio::test]
async fn login_roundtrip_and_logout() {
    let ctx = test_ctx().await;
    let company_id = register_active(&ctx, "Acme", "boss@acme.example").await;

    let (token, identity) = ctx
        .guard
        .login("boss@acme.example", "correct-horse")
        .await
        .unwrap();
    assert_eq!(identity.role, Role::Manager);
    assert_eq!(identity.company_id.as_deref(), Some(company_id.as_str()));

    let resolved = ctx.guard.authenticate(&token).await.unwrap();
    assert_eq!(resolved.user_id, identity.user_id);

    assert!(ctx.guard.logout(&token).await.unwrap());
    let err = ctx.guard.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthenticated(_)));
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_indistinguishable() {
    let ctx = test_ctx().await;
    register_active(&ctx, "Acme", "boss@acme.example").await;

    let wrong = ctx
        .guard
        .login("boss@acme.example", "not-the-password")
        .await
        .unwrap_err();
    let unknown = ctx
        .guard
        .login("nobody@acme.example", "whatever-pass")
        .await
        .unwrap_err();
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn missing_and_garbage_tokens_rejected() {
    let ctx = test_ctx().await;
    for token in ["", "deadbeef", "not-a-token-at-all"] {
        let err = ctx.guard.authenticate(token).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthenticated(_)));
    }
}

#[tokio::test]
async fn expired_token_rejected() {
    let ctx = test_ctx().await;
    register_active(&ctx, "Acme", "boss@acme.example").await;
    let (token, _) = ctx
        .guard
        .login("boss@acme.example", "correct-horse")
        .await
        .unwrap();

    // Backdate the expiry.
    sqlx::query("UPDATE auth_tokens SET expires_at = ?")
        .bind((chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339())
        .execute(&ctx.storage.pool())
        .await
        .unwrap();

    let err = ctx.guard.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthenticated(_)));

    // The janitor's prune removes the stale row entirely.
    let pruned = ctx
        .storage
        .prune_expired_tokens(&chrono::Utc::now().to_rfc3339())
        .await
        .unwrap();
    assert_eq!(pruned, 1);
}

#[tokio::test]
async fn membership_is_exact() {
    let ctx = test_ctx().await;
    let acme = register_active(&ctx, "Acme", "boss@acme.example").await;
    let globex = register_active(&ctx, "Globex", "boss@globex.example").await;

    let (_, identity) = ctx
        .guard
        .login("boss@acme.example", "correct-horse")
        .await
        .unwrap();
    assert!(ctx.guard.require_company_membership(&identity, &acme).is_ok());
    assert!(matches!(
        ctx.guard
            .require_company_membership(&identity, &globex)
            .unwrap_err(),
        WorkflowError::Forbidden(_)
    ));
}

#[tokio::test]
async fn role_changes_gate_on_grantor_rank() {
    let ctx = test_ctx().await;
    register_active(&ctx, "Acme", "boss@acme.example").await;
    let (_, manager) = ctx
        .guard
        .login("boss@acme.example", "correct-horse")
        .await
        .unwrap();

    // Platform staff.
    let salt = guard::new_salt();
    let hash = guard::hash_password(&salt, "admin-pass-123");
    let admin_row = ctx
        .storage
        .create_user("admin@platform.example", &hash, &salt, "admin", None)
        .await
        .unwrap();
    let super_row = ctx
        .storage
        .create_user(
            "root@platform.example",
            &guard::hash_password(&salt, "super-pass-123"),
            &salt,
            "super_admin",
            None,
        )
        .await
        .unwrap();
    let admin_token = ctx.guard.issue_token(&admin_row.id).await.unwrap();
    let super_token = ctx.guard.issue_token(&super_row.id).await.unwrap();
    let admin = ctx.guard.authenticate(&admin_token).await.unwrap();
    let superadmin = ctx.guard.authenticate(&super_token).await.unwrap();

    // A manager cannot touch roles at all.
    assert!(matches!(
        ctx.directory
            .set_user_role(&manager, &manager.user_id, "user")
            .await
            .unwrap_err(),
        WorkflowError::Forbidden(_)
    ));

    // An admin may move people below admin, but not mint admins.
    ctx.directory
        .set_user_role(&admin, &manager.user_id, "user")
        .await
        .unwrap();
    assert!(matches!(
        ctx.directory
            .set_user_role(&admin, &manager.user_id, "admin")
            .await
            .unwrap_err(),
        WorkflowError::Forbidden(_)
    ));

    // A super admin may.
    let updated = ctx
        .directory
        .set_user_role(&superadmin, &manager.user_id, "admin")
        .await
        .unwrap();
    assert_eq!(updated.role, "admin");
}

#[tokio::test]
async fn platform_staff_cannot_run_company_workflows() {
    let ctx = test_ctx().await;
    let salt = guard::new_salt();
    let row = ctx
        .storage
        .create_user(
            "admin@platform.example",
            &guard::hash_password(&salt, "admin-pass-123"),
            &salt,
            "admin",
            None,
        )
        .await
        .unwrap();
    let token = ctx.guard.issue_token(&row.id).await.unwrap();
    let identity = ctx.guard.authenticate(&token).await.unwrap();

    // No acting company — company-scoped mutations are off the table.
    let err = ctx
        .rfq
        .create(
            &identity,
            nexusd::rfq::RfqDraft {
                title: "t".into(),
                description: "d".into(),
                quantity: 1,
                budget: None,
                sector: None,
                deadline: None,
                targets: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

// ─── Property checks ─────────────────────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn any_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::User),
            Just(Role::Manager),
            Just(Role::Admin),
            Just(Role::SuperAdmin),
        ]
    }

    proptest! {
        #[test]
        fn allows_is_reflexive(r in any_role()) {
            prop_assert!(r.allows(r));
        }

        #[test]
        fn allows_is_transitive(a in any_role(), b in any_role(), c in any_role()) {
            if a.allows(b) && b.allows(c) {
                prop_assert!(a.allows(c));
            }
        }

        #[test]
        fn allows_is_antisymmetric(a in any_role(), b in any_role()) {
            if a.allows(b) && b.allows(a) {
                prop_assert_eq!(a, b);
            }
        }

        #[test]
        fn string_round_trip(r in any_role()) {
            prop_assert_eq!(Role::parse(r.as_str()), Some(r));
        }
    }
}
