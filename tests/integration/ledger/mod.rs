//! Token Ledger API tests (spec §4.C, §6 `/api/tokens/*`).

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{json, Value};
use studio_auth::UserRole;
use tower::ServiceExt;

use crate::common::TestApp;

fn authed_request(method: Method, uri: &str, jwt: &str, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", jwt));

    if let Some(b) = body {
        builder = builder.header("content-type", "application/json");
        builder.body(Body::from(serde_json::to_string(&b).unwrap())).unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    }
}

fn unauthed_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn parse_body(response: axum::http::Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

mod test_balance {
    use super::*;

    #[tokio::test]
    async fn test_balance_requires_authentication() {
        let app = TestApp::new().await.unwrap();

        let req = unauthed_request(Method::GET, "/api/tokens/balance");
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_balance_lazily_created_at_zero() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(Method::GET, "/api/tokens/balance", &jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 0);
        assert_eq!(body["total_earned"], 0);
        assert_eq!(body["total_spent"], 0);

        app.cleanup().await.unwrap();
    }
}

/// S1 — signup bonus (spec §8).
mod test_signup_bonus {
    use super::*;

    #[tokio::test]
    async fn test_signup_bonus_grants_once_and_is_idempotent() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);

        let alice = app.create_user(UserRole::User).await.unwrap();
        let alice_jwt = app.create_jwt(alice);

        let req = authed_request(
            Method::POST,
            "/api/tokens/signup-bonus",
            &admin_jwt,
            Some(json!({ "user_id": alice })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 1000);

        // GET /tokens/balance returns 1000.
        let req = authed_request(Method::GET, "/api/tokens/balance", &alice_jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 1000);

        // Second grant is a silent no-op: balance unchanged.
        let req = authed_request(
            Method::POST,
            "/api/tokens/signup-bonus",
            &admin_jwt,
            Some(json!({ "user_id": alice })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 1000);

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM token_transactions WHERE user_id = $1 AND reason_code = 'signup_bonus'",
        )
        .bind(alice)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(count.0, 1, "at most one signup_bonus transaction per user");

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_signup_bonus_requires_admin() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/signup-bonus",
            &jwt,
            Some(json!({ "user_id": user })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        app.cleanup().await.unwrap();
    }
}

mod test_admin_topup {
    use super::*;

    #[tokio::test]
    async fn test_admin_topup_credits_balance() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 500, "notes": "goodwill credit" })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 500);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_topup_rejected_for_non_admin() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &jwt,
            Some(json!({ "user_id": user, "amount": 500 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_topup_rejects_non_positive_amount() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 0 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        app.cleanup().await.unwrap();
    }
}

mod test_transaction_history {
    use super::*;

    #[tokio::test]
    async fn test_history_orders_newest_first_and_pages_by_cursor() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        for amount in [100, 200, 300] {
            let req = authed_request(
                Method::POST,
                "/api/tokens/admin/topup",
                &admin_jwt,
                Some(json!({ "user_id": user, "amount": amount })),
            );
            let resp = app.router().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let req = authed_request(Method::GET, "/api/tokens/history?limit=2", &jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = parse_body(resp).await;
        let page1 = body["transactions"].as_array().unwrap();
        assert_eq!(page1.len(), 2);
        // Newest first: the 300 top-up landed last, so it's first here.
        assert_eq!(page1[0]["amount"], 300);
        assert_eq!(page1[1]["amount"], 200);

        let cursor = body["next_cursor"].as_str().expect("expected a next cursor");
        let uri = format!("/api/tokens/history?limit=2&cursor={}", cursor);
        let req = authed_request(Method::GET, &uri, &jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let page2 = body["transactions"].as_array().unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0]["amount"], 100);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_filters_by_reason() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/signup-bonus",
            &admin_jwt,
            Some(json!({ "user_id": user })),
        );
        app.router().oneshot(req).await.unwrap();

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 50 })),
        );
        app.router().oneshot(req).await.unwrap();

        let req = authed_request(
            Method::GET,
            "/api/tokens/history?reason=signup_bonus",
            &jwt,
            None,
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let rows = body["transactions"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["reason_code"], "signup_bonus");

        app.cleanup().await.unwrap();
    }
}
