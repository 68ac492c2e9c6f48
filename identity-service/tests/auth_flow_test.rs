mod common;

use chrono::Utc;
use common::{TestApp, PASSWORD};
use identity_service::dtos::auth::{RefreshRequest, RevokeAllRequest};
use identity_service::models::Session;
use identity_service::services::{AuthError, RequestContext, SessionStore, TokenScheme};
use identity_service::utils::ValidationError;
use std::time::Duration;
use tokio_test::assert_ok;
use tonic::Code;

async fn register_alice(app: &TestApp) -> identity_service::services::AuthSession {
    app.auth
        .register(&app.ctx(), "alice@example.com", "alice", PASSWORD)
        .await
        .unwrap()
}

async fn age_session(app: &TestApp, refresh_token: &str) {
    let mut session = app
        .store
        .get_session_by_token_hash(&Session::hash_token(refresh_token))
        .await
        .unwrap()
        .unwrap();
    session.expires_at = Utc::now().timestamp() - 1;
    app.store.update_session(&session).await.unwrap();
}

#[tokio::test]
async fn test_register_creates_identity_and_session() {
    let app = TestApp::new();
    let session = register_alice(&app).await;

    assert_eq!(session.identity.email.as_str(), "alice@example.com");
    assert_eq!(session.identity.username.as_str(), "alice");
    assert_ne!(session.identity.password_hash.as_str(), PASSWORD);
    assert!(session.identity.password_hash.as_str().starts_with("$argon2id$"));
    assert_eq!(app.store.identity_count().await, 1);
    assert_eq!(app.store.session_count().await, 1);

    let payload = app
        .auth
        .token_maker()
        .verify(&session.tokens.access_token)
        .unwrap();
    assert_eq!(payload.subject, "alice");

    let stored = app
        .store
        .get_session_by_token_hash(&Session::hash_token(&session.tokens.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.identity_id, session.identity.id);
    assert_eq!(stored.expires_at, session.tokens.refresh_token_expires_at);
    assert!(!stored.revoked);
}

#[tokio::test]
async fn test_register_reports_first_violation_without_writes() {
    let app = TestApp::new();
    let cases = [
        ("", "alice", PASSWORD, ValidationError::EmailRequired),
        ("not-an-email", "alice", PASSWORD, ValidationError::InvalidEmail),
        ("alice@example.com", "a", PASSWORD, ValidationError::InvalidUsername),
        ("alice@example.com", "alice", "weak", ValidationError::InvalidPassword),
        ("bad", "a", "weak", ValidationError::InvalidEmail),
    ];

    for (email, username, password, expected) in cases {
        let err = app
            .auth
            .register(&app.ctx(), email, username, password)
            .await
            .unwrap_err();
        match err {
            AuthError::InvalidInput(actual) => assert_eq!(actual, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    }

    assert_eq!(app.store.identity_count().await, 0);
    assert_eq!(app.store.session_count().await, 0);
}

#[tokio::test]
async fn test_register_duplicates_conflict() {
    let app = TestApp::new();
    register_alice(&app).await;

    let same_email = app
        .auth
        .register(&app.ctx(), "alice@example.com", "alice2", PASSWORD)
        .await;
    assert!(matches!(same_email, Err(AuthError::ConflictIdentityExists)));

    let same_username = app
        .auth
        .register(&app.ctx(), "other@example.com", "alice", PASSWORD)
        .await;
    assert!(matches!(same_username, Err(AuthError::ConflictIdentityExists)));

    assert_eq!(app.store.identity_count().await, 1);
    assert_eq!(app.store.session_count().await, 1);
}

#[tokio::test]
async fn test_register_rolls_back_when_session_write_fails() {
    let app = TestApp::new();
    app.store.fail_session_inserts(true);

    let err = app
        .auth
        .register(&app.ctx(), "alice@example.com", "alice", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Internal { operation: "register", .. }));
    assert_eq!(app.store.identity_count().await, 0);

    // The same identity can be registered once the store recovers.
    app.store.fail_session_inserts(false);
    register_alice(&app).await;
    assert_eq!(app.store.identity_count().await, 1);
}

#[tokio::test]
async fn test_canceled_register_leaves_nothing() {
    let app = TestApp::new();
    let ctx = RequestContext::background();
    ctx.cancel();

    let err = app
        .auth
        .register(&ctx, "alice@example.com", "alice", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Canceled));
    assert_eq!(app.store.identity_count().await, 0);
}

#[tokio::test]
async fn test_expired_deadline_fails_at_entry() {
    let app = TestApp::new();
    let ctx = RequestContext::with_timeout(Duration::ZERO);

    let err = app
        .auth
        .login(&ctx, "alice@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DeadlineExceeded));
}

#[tokio::test]
async fn test_login_issues_a_fresh_pair() {
    let app = TestApp::new();
    let registered = register_alice(&app).await;

    let logged_in = app
        .auth
        .login(&app.ctx(), "alice@example.com", PASSWORD)
        .await
        .unwrap();

    assert_eq!(logged_in.identity.id, registered.identity.id);
    assert_ne!(logged_in.tokens.access_token, registered.tokens.access_token);
    assert_ne!(logged_in.tokens.refresh_token, registered.tokens.refresh_token);
    assert_eq!(app.store.session_count().await, 2);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::new();
    register_alice(&app).await;

    let wrong_password = app
        .auth
        .login(&app.ctx(), "alice@example.com", "Wr0ng!Pass")
        .await;
    assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));

    let unknown = app
        .auth
        .login(&app.ctx(), "nobody@example.com", PASSWORD)
        .await;
    assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));

    let missing = app.auth.login(&app.ctx(), "alice@example.com", "").await;
    assert!(matches!(
        missing,
        Err(AuthError::InvalidInput(ValidationError::PasswordRequired))
    ));
}

#[tokio::test]
async fn test_refresh_rotates_the_session() {
    let app = TestApp::new();
    let registered = register_alice(&app).await;
    let old = registered.tokens.refresh_token;

    let rotated = app.auth.refresh(&app.ctx(), &old).await.unwrap();
    assert_ne!(rotated.refresh_token, old);
    assert_ne!(rotated.access_token, registered.tokens.access_token);

    let old_session = app
        .store
        .get_session_by_token_hash(&Session::hash_token(&old))
        .await
        .unwrap()
        .unwrap();
    assert!(old_session.revoked);

    let new_session = app
        .store
        .get_session_by_token_hash(&Session::hash_token(&rotated.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert!(new_session.is_valid());
    assert_eq!(new_session.identity_id, registered.identity.id);

    // The successor can itself be rotated.
    assert_ok!(app.auth.refresh(&app.ctx(), &rotated.refresh_token).await);
}

#[tokio::test]
async fn test_refresh_twice_with_same_token_fails() {
    let app = TestApp::new();
    let token = register_alice(&app).await.tokens.refresh_token;

    assert_ok!(app.auth.refresh(&app.ctx(), &token).await);
    let second = app.auth.refresh(&app.ctx(), &token).await;
    assert!(matches!(second, Err(AuthError::RevokedToken)));

    let status = app
        .boundary
        .refresh_token(RefreshRequest {
            refresh_token: token,
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert!(status.message().ends_with("invalid token"));
}

#[tokio::test]
async fn test_refresh_rejects_unknown_and_malformed_tokens() {
    let app = TestApp::new();
    let registered = register_alice(&app).await;

    let empty = app.auth.refresh(&app.ctx(), "").await;
    assert!(matches!(
        empty,
        Err(AuthError::InvalidInput(ValidationError::RefreshTokenRequired))
    ));

    let garbage = app.auth.refresh(&app.ctx(), "not.a.token").await;
    assert!(matches!(garbage, Err(AuthError::InvalidToken)));

    // Well signed but never stored.
    let stray = app
        .auth
        .token_maker()
        .mint_refresh("alice", chrono::Duration::days(1))
        .unwrap();
    let unknown = app.auth.refresh(&app.ctx(), &stray.token).await;
    assert!(matches!(unknown, Err(AuthError::InvalidToken)));

    // An access token has no session behind it.
    let access = app
        .auth
        .refresh(&app.ctx(), &registered.tokens.access_token)
        .await;
    assert!(matches!(access, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn test_refresh_with_expired_session_fails() {
    let app = TestApp::new();
    let token = register_alice(&app).await.tokens.refresh_token;
    age_session(&app, &token).await;

    let err = app.auth.refresh(&app.ctx(), &token).await.unwrap_err();
    assert!(matches!(err, AuthError::ExpiredToken));
}

#[tokio::test]
async fn test_revoke_token() {
    let app = TestApp::new();
    let token = register_alice(&app).await.tokens.refresh_token;

    assert_ok!(app.auth.revoke_token(&app.ctx(), &token).await);

    let again = app.auth.revoke_token(&app.ctx(), &token).await;
    assert!(matches!(again, Err(AuthError::InvalidToken)));

    let refresh = app.auth.refresh(&app.ctx(), &token).await;
    assert!(matches!(refresh, Err(AuthError::RevokedToken)));

    let unknown = app.auth.revoke_token(&app.ctx(), "never-issued").await;
    assert!(matches!(unknown, Err(AuthError::InvalidToken)));

    let empty = app.auth.revoke_token(&app.ctx(), "").await;
    assert!(matches!(
        empty,
        Err(AuthError::InvalidInput(ValidationError::RefreshTokenRequired))
    ));
}

#[tokio::test]
async fn test_revoke_all_user_tokens() {
    let app = TestApp::new();
    let registered = register_alice(&app).await;
    let logged_in = app
        .auth
        .login(&app.ctx(), "alice@example.com", PASSWORD)
        .await
        .unwrap();
    let owner = registered.identity.id.to_string();

    let revoked = app
        .auth
        .revoke_all_user_tokens(&app.ctx(), &owner)
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    for token in [
        registered.tokens.refresh_token,
        logged_in.tokens.refresh_token,
    ] {
        let err = app.auth.refresh(&app.ctx(), &token).await.unwrap_err();
        assert!(matches!(err, AuthError::RevokedToken));
    }

    // Nothing left to revoke is still acknowledged.
    let ack = app
        .boundary
        .revoke_all_user_tokens(RevokeAllRequest {
            identity_id: owner,
        })
        .await
        .unwrap();
    assert!(ack.success);
    assert_eq!(ack.affected, Some(0));

    let bad = app.auth.revoke_all_user_tokens(&app.ctx(), "not-a-uuid").await;
    assert!(matches!(
        bad,
        Err(AuthError::InvalidInput(ValidationError::InvalidIdentityId))
    ));
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_sessions() {
    let app = TestApp::new();
    let stale = register_alice(&app).await.tokens.refresh_token;
    let live = app
        .auth
        .login(&app.ctx(), "alice@example.com", PASSWORD)
        .await
        .unwrap()
        .tokens
        .refresh_token;
    age_session(&app, &stale).await;

    let removed = app.auth.cleanup_expired_tokens(&app.ctx()).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(app.store.session_count().await, 1);
    assert_ok!(app.auth.refresh(&app.ctx(), &live).await);

    assert_eq!(app.auth.cleanup_expired_tokens(&app.ctx()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_identity_cascades_sessions() {
    let app = TestApp::new();
    let registered = register_alice(&app).await;
    let id = registered.identity.id.to_string();

    assert_ok!(app.auth.delete_identity(&app.ctx(), &id).await);
    assert_eq!(app.store.identity_count().await, 0);
    assert_eq!(app.store.session_count().await, 0);

    let refresh = app
        .auth
        .refresh(&app.ctx(), &registered.tokens.refresh_token)
        .await;
    assert!(matches!(refresh, Err(AuthError::InvalidToken)));

    let again = app.auth.delete_identity(&app.ctx(), &id).await;
    assert!(matches!(again, Err(AuthError::NotFoundIdentity)));
}

#[tokio::test]
async fn test_rate_limit_per_operation() {
    let app = TestApp::with_rate_limit(1);
    register_alice(&app).await;

    assert_ok!(
        app.auth
            .login(&app.ctx(), "alice@example.com", PASSWORD)
            .await
    );
    let limited = app
        .auth
        .login(&app.ctx(), "alice@example.com", PASSWORD)
        .await;
    assert!(matches!(
        limited,
        Err(AuthError::RateLimited { operation: "login", .. })
    ));

    let status = app.boundary.cleanup_expired_tokens().await;
    assert!(status.is_ok());
    let status = app.boundary.cleanup_expired_tokens().await.unwrap_err();
    assert_eq!(status.code(), Code::ResourceExhausted);
}

#[tokio::test]
async fn test_sealed_scheme_full_flow() {
    let app = TestApp::with_scheme(TokenScheme::Sealed);
    let registered = register_alice(&app).await;
    assert!(registered.tokens.access_token.starts_with("v1.sealed."));

    let rotated = app
        .auth
        .refresh(&app.ctx(), &registered.tokens.refresh_token)
        .await
        .unwrap();
    assert!(rotated.refresh_token.starts_with("v1.sealed."));

    let reused = app
        .auth
        .refresh(&app.ctx(), &registered.tokens.refresh_token)
        .await;
    assert!(matches!(reused, Err(AuthError::RevokedToken)));
}
