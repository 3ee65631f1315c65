//! Generation Pipeline API tests (spec §4.F, §4.G, §4.I, §6, §8 scenarios
//! S2/S3/S5/S6).

use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use studio_auth::UserRole;
use studio_generations::GenerationStatus;
use studio_queue::{EnqueueOptions, JobQueue};
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

async fn grant(app: &TestApp, admin_jwt: &str, user: Uuid, amount: i64) {
    let req = authed_request(
        Method::POST,
        "/api/tokens/admin/topup",
        admin_jwt,
        Some(json!({ "user_id": user, "amount": amount })),
    );
    let resp = app.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

fn fresh_image(filename: &str) -> Value {
    json!({
        "type": "fresh",
        "data": STANDARD.encode(b"stand-in-bytes"),
        "mime": "image/png",
        "filename": filename,
    })
}

mod test_operations_catalog {
    use super::*;

    #[tokio::test]
    async fn test_lists_active_operation_types_with_costs() {
        let app = TestApp::new().await.unwrap();

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/generate/operations")
            .body(Body::empty())
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = parse_body(resp).await;
        let ops = body["operations"].as_array().unwrap();
        assert_eq!(ops.len(), 3);

        let text_to_image = ops
            .iter()
            .find(|o| o["name"] == "text_to_image")
            .expect("text_to_image in catalog");
        assert_eq!(text_to_image["tokens_per_operation"], 100);

        app.cleanup().await.unwrap();
    }
}

/// S2 — successful text-to-image (N=2) (spec §8).
mod test_text_to_image_success {
    use super::*;

    #[tokio::test]
    async fn test_s2_full_pipeline_debits_and_completes() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let alice = app.create_user(UserRole::User).await.unwrap();
        let alice_jwt = app.create_jwt(alice);
        grant(&app, &admin_jwt, alice, 1000).await;

        let mut rx = app.rooms.subscribe(alice);

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &alice_jwt,
            Some(json!({
                "prompt": "a red apple",
                "number_of_images": 2,
                "aspect_ratio": "1:1",
            })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = parse_body(resp).await;
        assert_eq!(body["status"], "pending");
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let row = app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;
        assert_eq!(row.status, GenerationStatus::Completed);
        assert_eq!(row.tokens_used, 200);

        // Progress events were emitted in increasing order, ending in a
        // completed event carrying both image URLs.
        let mut saw_completed = false;
        let mut last_percent = -1i64;
        for _ in 0..32 {
            let Ok(event) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await else {
                break;
            };
            let event = event.unwrap();
            match event {
                studio_realtime::Event::GenerationProgress { percent, .. } => {
                    assert!(percent as i64 >= last_percent, "progress must not regress");
                    last_percent = percent as i64;
                }
                studio_realtime::Event::GenerationCompleted { output_upload_ids, result, .. } => {
                    assert_eq!(output_upload_ids.len(), 2);
                    assert_eq!(result.images.len(), 2);
                    assert!(result.images.iter().all(|img| !img.image_url.is_empty()));
                    assert_eq!(result.tokens.used, 200);
                    assert_eq!(result.tokens.remaining, 800);
                    saw_completed = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_completed, "expected a generation.completed event");

        let req = authed_request(Method::GET, "/api/tokens/balance", &alice_jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 800);

        let spend_count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM token_transactions WHERE user_id = $1 AND reason_code = 'spend_generation' AND reference_id = $2 AND amount = 200",
        )
        .bind(alice)
        .bind(generation_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(spend_count.0, 1);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_rejects_short_prompt() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &jwt,
            Some(json!({ "prompt": "hi" })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_rejects_too_many_images() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &jwt,
            Some(json!({ "prompt": "a perfectly reasonable prompt", "number_of_images": 5 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        app.cleanup().await.unwrap();
    }
}

/// S3 — insufficient tokens (spec §8).
mod test_insufficient_tokens {
    use super::*;

    #[tokio::test]
    async fn test_s3_worker_fails_without_charging() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let bob = app.create_user(UserRole::User).await.unwrap();
        let bob_jwt = app.create_jwt(bob);
        grant(&app, &admin_jwt, bob, 50).await;

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &bob_jwt,
            Some(json!({ "prompt": "a blue ocean at sunset", "number_of_images": 1 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let row = app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;
        assert_eq!(row.status, GenerationStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some("insufficient_tokens"));
        assert_eq!(row.tokens_used, 0);

        let req = authed_request(Method::GET, "/api/tokens/balance", &bob_jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        assert_eq!(body["balance"], 50);

        app.cleanup().await.unwrap();
    }
}

/// S5 — at-least-once delivery (spec §8).
mod test_redelivery_idempotency {
    use super::*;

    #[tokio::test]
    async fn test_s5_redelivering_a_completed_job_is_a_no_op() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);
        grant(&app, &admin_jwt, user, 1000).await;

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &jwt,
            Some(json!({ "prompt": "a calm mountain lake", "number_of_images": 1 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let row = app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;
        assert_eq!(row.status, GenerationStatus::Completed);

        let balance_before: (i64,) = sqlx::query_as(
            "SELECT balance FROM user_token_balances WHERE user_id = $1",
        )
        .bind(user)
        .fetch_one(&app.pool)
        .await
        .unwrap();

        // Simulate the queue redelivering the already-processed job.
        let payload = serde_json::json!({ "generation_id": generation_id, "user_id": user });
        app.queue
            .enqueue("image-generation", "text_to_image", payload, EnqueueOptions::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        let balance_after: (i64,) = sqlx::query_as(
            "SELECT balance FROM user_token_balances WHERE user_id = $1",
        )
        .bind(user)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(balance_before.0, balance_after.0, "redelivery must not re-debit");

        let spend_count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM token_transactions WHERE user_id = $1 AND reason_code = 'spend_generation' AND reference_id = $2",
        )
        .bind(user)
        .bind(generation_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(spend_count.0, 1, "exactly one debit regardless of redelivery");

        let output_count: (i64,) = sqlx::query_as(
            "SELECT jsonb_array_length(ai_metadata->'imageIds') FROM generations WHERE id = $1",
        )
        .bind(generation_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(output_count.0, 1, "no duplicate outputs attached");

        app.cleanup().await.unwrap();
    }
}

/// S6 — multi-reference validation (spec §8).
mod test_multi_reference_validation {
    use super::*;

    #[tokio::test]
    async fn test_s6_zero_references_rejected() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(
            Method::POST,
            "/api/generate/image-multiple-reference",
            &jwt,
            Some(json!({
                "prompt": "combine these reference subjects",
                "reference_type": "subject",
                "target": fresh_image("target.png"),
                "references": [],
            })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_s6_six_references_rejected() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let references: Vec<Value> = (0..6).map(|i| fresh_image(&format!("ref{}.png", i))).collect();

        let req = authed_request(
            Method::POST,
            "/api/generate/image-multiple-reference",
            &jwt,
            Some(json!({
                "prompt": "combine these reference subjects",
                "reference_type": "subject",
                "target": fresh_image("target.png"),
                "references": references,
            })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_s6_target_and_three_references_debits_200_per_image() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);
        grant(&app, &admin_jwt, user, 1000).await;

        let references: Vec<Value> = (0..3).map(|i| fresh_image(&format!("ref{}.png", i))).collect();

        let req = authed_request(
            Method::POST,
            "/api/generate/image-multiple-reference",
            &jwt,
            Some(json!({
                "prompt": "combine these reference subjects",
                "reference_type": "subject",
                "target": fresh_image("target.png"),
                "references": references,
            })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let row = app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;
        assert_eq!(row.status, GenerationStatus::Completed);
        assert_eq!(row.tokens_used, 200);

        app.cleanup().await.unwrap();
    }
}

mod test_timeline_and_queue_status {
    use super::*;

    #[tokio::test]
    async fn test_queue_status_forbidden_for_non_owner() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let owner = app.create_user(UserRole::User).await.unwrap();
        let owner_jwt = app.create_jwt(owner);
        let stranger = app.create_user(UserRole::User).await.unwrap();
        let stranger_jwt = app.create_jwt(stranger);
        grant(&app, &admin_jwt, owner, 1000).await;

        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &owner_jwt,
            Some(json!({ "prompt": "a quiet forest path", "number_of_images": 1 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();

        let uri = format!("/api/generate/queue/{}", generation_id);
        let req = authed_request(Method::GET, &uri, &stranger_jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = authed_request(Method::GET, &uri, &owner_jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_status_unknown_id_is_404() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let uri = format!("/api/generate/queue/{}", Uuid::new_v4());
        let req = authed_request(Method::GET, &uri, &jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_my_generations_timeline_excludes_failed_by_default() {
        let app = TestApp::new().await.unwrap();
        let admin = app.create_user(UserRole::Admin).await.unwrap();
        let admin_jwt = app.create_jwt(admin);
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);
        grant(&app, &admin_jwt, user, 50).await;

        // Not enough balance: worker will fail this one.
        let req = authed_request(
            Method::POST,
            "/api/generate/text-to-image",
            &jwt,
            Some(json!({ "prompt": "a prompt that will fail", "number_of_images": 1 })),
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let generation_id: Uuid = serde_json::from_value(body["generation_id"].clone()).unwrap();
        app.wait_for_terminal(generation_id, Duration::from_secs(10)).await;

        let req = authed_request(Method::GET, "/api/generate/my-generations", &jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 0);

        let req = authed_request(
            Method::GET,
            "/api/generate/my-generations?include_failed=true",
            &jwt,
            None,
        );
        let resp = app.router().oneshot(req).await.unwrap();
        let body = parse_body(resp).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["status"], "failed");
        assert_eq!(results[0]["tokens_used"], 0);

        app.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_my_queue_only_shows_in_flight() {
        let app = TestApp::new().await.unwrap();
        let user = app.create_user(UserRole::User).await.unwrap();
        let jwt = app.create_jwt(user);

        let req = authed_request(Method::GET, "/api/generate/my-queue", &jwt, None);
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = parse_body(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 0);

        app.cleanup().await.unwrap();
    }
}

mod test_queue_ops {
    use super::*;

    #[tokio::test]
    async fn test_queue_health_and_metrics_are_reachable() {
        let app = TestApp::new().await.unwrap();

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/queue/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = parse_body(resp).await;
        assert_eq!(body["healthy"], true);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/queue/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        app.cleanup().await.unwrap();
    }
}
