//! Route guard and navigator against a mock API
//!
//! Covers the three guard scenarios for both session scopes plus route
//! resolution (public, guarded, unknown).

mod common;

use common::{context_for, ok};
use parcel_core::{GuardState, Navigator, Resolution, Route, RouteGuard, SessionScope, UnauthorizedReason};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_no_token_is_unauthorized_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok(json!({ "authenticated": true })))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    for (scope, login) in [(SessionScope::Customer, "/login"), (SessionScope::Admin, "/admin/login")] {
        let state = RouteGuard::new(ctx.api.clone(), scope).check().await;
        assert_eq!(
            state,
            GuardState::Unauthorized {
                redirect: login,
                reason: UnauthorizedReason::NoToken
            }
        );
        assert!(state.notice().is_none());
    }
}

#[tokio::test]
async fn test_rejected_token_is_cleared() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/auth/verify"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthenticated." })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    ctx.sessions()
        .admin
        .store_login("expired", &json!({ "id": 1, "name": "Admin" }))
        .unwrap();

    let state = RouteGuard::new(ctx.api.clone(), SessionScope::Admin).check().await;

    assert_eq!(
        state,
        GuardState::Unauthorized {
            redirect: "/admin/login",
            reason: UnauthorizedReason::Rejected
        }
    );
    assert_eq!(state.notice().unwrap().title, "Session expired");
    assert!(ctx.sessions().admin.token().is_none());
    assert!(ctx.sessions().admin.user().is_none());
}

#[tokio::test]
async fn test_customer_verify_failure_clears_customer_keys_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    ctx.sessions().customer.store_login("cust", &json!({ "id": 7 })).unwrap();
    ctx.sessions().admin.store_login("adm", &json!({ "id": 1 })).unwrap();

    let state = RouteGuard::new(ctx.api.clone(), SessionScope::Customer).check().await;

    assert!(!state.is_authorized());
    assert!(ctx.sessions().customer.token().is_none());
    assert_eq!(ctx.sessions().admin.token().as_deref(), Some("adm"));
}

#[tokio::test]
async fn test_valid_token_authorizes_after_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ok(json!({
            "authenticated": true,
            "user": { "id": 7, "name": "Ana", "email": "ana@example.com" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    ctx.sessions().customer.store_login("good", &json!({ "id": 7 })).unwrap();

    match RouteGuard::new(ctx.api.clone(), SessionScope::Customer).check().await {
        GuardState::Authorized { user } => assert_eq!(user.unwrap()["name"], "Ana"),
        other => panic!("Expected Authorized, got {:?}", other),
    }
    assert_eq!(ctx.sessions().customer.token().as_deref(), Some("good"));
}

#[tokio::test]
async fn test_unauthenticated_payload_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .respond_with(ok(json!({ "authenticated": false })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    ctx.sessions().customer.store_login("tok", &json!({})).unwrap();

    let state = RouteGuard::new(ctx.api.clone(), SessionScope::Customer).check().await;
    assert!(matches!(
        state,
        GuardState::Unauthorized {
            reason: UnauthorizedReason::Rejected,
            ..
        }
    ));
    assert!(!ctx.sessions().customer.is_present());
}

#[tokio::test]
async fn test_navigator_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/auth/verify"))
        .respond_with(ok(json!({ "authenticated": true, "user": { "id": 1 } })))
        .expect(2)
        .mount(&server)
        .await;

    let ctx = context_for(&server);
    ctx.sessions().admin.store_login("adm", &json!({ "id": 1 })).unwrap();
    let navigator = Navigator::new(ctx.api.clone());

    assert_eq!(
        navigator.resolve("/does-not-exist").await,
        Resolution::Render {
            route: Route::NotFound,
            user: None
        }
    );
    assert_eq!(
        navigator.resolve("/login").await,
        Resolution::Render {
            route: Route::Login,
            user: None
        }
    );
    assert_eq!(
        navigator.resolve("/settings").await,
        Resolution::Redirect {
            from: Route::Settings,
            to: "/login",
            notice: None
        }
    );

    // Each navigation re-verifies.
    for location in ["/admin/discounts", "/admin"] {
        match navigator.resolve(location).await {
            Resolution::Render { route, user } => {
                assert_eq!(route, Route::parse(location));
                assert_eq!(user.unwrap()["id"], 1);
            }
            other => panic!("Expected Render, got {:?}", other),
        }
    }
}
