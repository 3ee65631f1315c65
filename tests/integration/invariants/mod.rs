//! Cross-domain property tests (spec §8): conservation, append-only
//! ledger, monotonic balances, terminal-state consistency, redelivery
//! idempotency and rate-limit safety — properties that don't belong to a
//! single endpoint but must hold across the whole pipeline.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{json, Value};
use studio_auth::UserRole;
use studio_generations::GenerationStatus;
use tower::ServiceExt;
use uuid::Uuid;

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

async fn parse_body(response: axum::http::Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Property 1 — conservation: `total_earned - total_spent = balance`,
/// `balance >= 0` (DB `CHECK` constraint backed up here as a property over
/// a sequence of mutations, spec §4.C).
mod test_conservation {
    use super::*;

    #[tokio::test]
    async fn test_balance_always_equals_earned_minus_spent() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();

        for amount in [1000, 250, 75] {
            let req = authed_request(
                Method::POST,
                "/api/tokens/admin/topup",
                &admin_jwt,
                Some(json!({ "user_id": user, "amount": amount })),
            );
            let resp = app.router().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT balance, total_earned, total_spent FROM user_token_balances WHERE user_id = $1",
        )
        .bind(user)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        let (balance, total_earned, total_spent) = row;
        assert_eq!(balance, total_earned - total_spent);
        assert!(balance >= 0);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_is_rejected_at_the_ledger() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();

        let err = app
            .ledger
            .debit(
                user,
                10,
                studio_ledger::ReasonCode::SpendGeneration,
                studio_ledger::LedgerMutationOptions::default(),
            )
            .await
            .expect_err("debiting a zero balance must fail");
        assert!(matches!(err, studio_common::Error::InsufficientBalance(_)));

        app.cleanup().await.unwrap();
    }
}

/// Property 2 — append-only ledger: at most one transaction per
/// `(user_id, idempotency_key)` (spec §4.C, enforced by the partial unique
/// index on `token_transactions`).
mod test_append_only_idempotency {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_a_no_op_not_an_error() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();

        let key = format!("test-idem:{}", Uuid::new_v4());
        for _ in 0..3 {
            app.ledger
                .credit(
                    user,
                    400,
                    studio_ledger::ReasonCode::AdminTopup,
                    studio_ledger::LedgerMutationOptions {
                        idempotency_key: Some(key.clone()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let balance = app.ledger.get_balance(user).await.unwrap();
        assert_eq!(balance.balance, 400, "only the first credit under this key should apply");

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM token_transactions WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(user)
        .bind(&key)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(count.0, 1);

        app.cleanup().await.unwrap();
    }
}

/// Property 3 — ledger monotonicity: `balance_after` values, read back in
/// insertion order, form the running total implied by each transaction's
/// signed amount.
mod test_ledger_monotonicity {
    use super::*;

    #[tokio::test]
    async fn test_balance_after_tracks_running_total_in_order() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();

        for amount in [100, 250, 50] {
            let req = authed_request(
                Method::POST,
                "/api/tokens/admin/topup",
                &admin_jwt,
                Some(json!({ "user_id": user, "amount": amount })),
            );
            app.router().oneshot(req).await.unwrap();
        }

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT amount, balance_after FROM token_transactions WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user)
        .fetch_all(&app.pool)
        .await
        .unwrap();

        let mut running = 0i64;
        for (amount, balance_after) in rows {
            running += amount;
            assert_eq!(balance_after, running);
        }

        app.cleanup().await.unwrap();
    }
}

/// Property 4 — generation terminal invariants (spec §4.F, §8): a
/// `completed` generation's output count matches `numberOfImages` and its
/// `tokensUsed` equals `tokensPerOperation * numberOfImages`; a `failed`
/// generation never charges tokens.
mod test_terminal_invariants {
    use super::*;

    #[tokio::test]
    async fn test_completed_generation_charges_exactly_cost_for_image_count() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 1000 })),
        );
        app.router().oneshot(req).await.unwrap();

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &jwt,
            Some(json!({ "prompt": "a field of sunflowers", "number_of_images": 3 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let row = app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;
        assert_eq!(row.status, GenerationStatus::Completed);
        assert_eq!(row.tokens_used, 300);
        assert_eq!(row.image_ids().len(), 3);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_generation_never_charges_tokens() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 20 })),
        );
        app.router().oneshot(req).await.unwrap();

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &jwt,
            Some(json!({ "prompt": "an underfunded request", "number_of_images": 1 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let row = app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;
        assert_eq!(row.status, GenerationStatus::Failed);
        assert_eq!(row.tokens_used, 0);
        assert!(row.image_ids().is_empty());

        let spend_count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM token_transactions WHERE reference_id = $1",
        )
        .bind(generation_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(spend_count.0, 0);

        app.cleanup().await.unwrap();
    }
}

/// Property 6 — rate-limit safety (spec §4.B, §8): bursts within the
/// configured window never get refused below the limit, and the adapter
/// itself (not the HTTP layer) is what throttles provider calls. The
/// per-user sliding window is exercised directly at the `ProviderAdapter`
/// unit level (`crates/provider/src/lib.rs`); this checks the same
/// property holds when driven through the full intake -> worker path by
/// firing more concurrent generations than the configured window allows
/// and confirming every one of them still reaches a terminal state.
mod test_rate_limit_safety {
    use super::*;

    #[tokio::test]
    async fn test_burst_of_generations_all_reach_a_terminal_state() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 5000 })),
        );
        app.router().oneshot(req).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..8 {
            let req = authed_request(
                Method::POST,
                "/api/generate/text-to-image",
                &jwt,
                Some(json!({ "prompt": format!("burst request number {}", i), "number_of_images": 1 })),
            );
            let resp = app.router().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::ACCEPTED);
            let body = parse_body(resp).await;
            ids.push(Uuid::parse_str(body["generation_id"].as_str().unwrap()).unwrap());
        }

        for id in ids {
            let row = app.wait_for_terminal(id, Duration::from_secs(15)).await;
            assert!(row.status.is_terminal(), "every queued job must eventually settle");
        }

        app.cleanup().await.unwrap();
    }
}

/// Property 8 — timeline cursor completeness: paging through with a fixed
/// limit visits every row exactly once, regardless of page size.
mod test_timeline_cursor_completeness {
    use super::*;

    #[tokio::test]
    async fn test_paging_visits_every_row_exactly_once() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/tokens/admin/topup",
            &admin_jwt,
            Some(json!({ "user_id": user, "amount": 2000 })),
        );
        app.router().oneshot(req).await.unwrap();

        let mut expected = Vec::new();
        for i in 0..5 {
            let req = authed_request(
                Method::POST,
                "/api/generate/text-to-image",
                &jwt,
                Some(json!({ "prompt": format!("timeline entry number {}", i), "number_of_images": 1 })),
            );
            let resp = app.router().oneshot(req).await.unwrap();
            let body = parse_body(resp).await;
            let id = body["generation_id"].as_str().unwrap().to_string();
            app.wait_for_terminal(Uuid::parse_str(&id).unwrap(), Duration::from_secs(10)).await;
            expected.push(id);
        }

        let mut seen = std::collections::HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let uri = match &cursor {
                Some(c) => format!("/api/generate/my-generations?limit=2&cursor={}", c),
                None => "/api/generate/my-generations?limit=2".to_string(),
            };
            let req = authed_request(Method::GET, &uri, &jwt, None);
            let resp = app.router().oneshot(req).await.unwrap();
            let body = parse_body(resp).await;
            let page = body["results"].as_array().unwrap();
            for row in page {
                let id = row["generation_id"].as_str().unwrap().to_string();
                assert!(seen.insert(id), "each generation should appear on exactly one page");
            }
            if body["cursor"]["has_more"].as_bool().unwrap_or(false) {
                cursor = body["cursor"]["next"].as_str().map(|s| s.to_string());
            } else {
                break;
            }
        }

        assert_eq!(seen.len(), expected.len());
        for id in expected {
            assert!(seen.contains(&id));
        }

        app.cleanup().await.unwrap();
    }
}
