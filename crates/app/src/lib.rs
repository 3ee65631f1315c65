//! Studio application composition root (spec §9 "process-wide
//! composition-root" redesign flag).
//!
//! Constructs and wires the Object Store Facade, Token Ledger, Job Queue,
//! Worker Pool, Generative Provider Adapter and Realtime Event Fabric
//! exactly once at startup, then composes the domain routers into a
//! single `Router`. Mirrors the teacher's `create_app(Config, PgPool)`
//! shape, generalized to this spec's subsystem set.

use std::sync::Arc;

use axum::extract::FromRef;
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use studio_auth::{AuthBackend, AuthConfig};
use studio_common::config::Config;
use studio_generations::GenerationProcessor;
use studio_generations::{GenerationsRepository, OperationTypeRepository, PromptTemplateRepository, UploadRepository};
use studio_ledger::{LedgerRepository, TokenLedger};
use studio_provider::{ProviderConfig, ProviderServiceFactory};
use studio_queue::{JobProcessor, QueueConfig, QueueServiceFactory, SubscribeOptions};
use studio_realtime::rooms::RoomRegistry;
use studio_storage::{StorageConfig, StorageServiceFactory};

const IMAGE_GENERATION_QUEUE: &str = "image-generation";

/// Shared state for routes that don't belong to a single domain: the
/// realtime websocket upgrade and the process-liveness `/health` check.
#[derive(Clone)]
struct RealtimeState {
    auth: AuthBackend,
    rooms: Arc<RoomRegistry>,
}

impl FromRef<RealtimeState> for AuthBackend {
    fn from_ref(state: &RealtimeState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<RealtimeState> for Arc<RoomRegistry> {
    fn from_ref(state: &RealtimeState) -> Self {
        state.rooms.clone()
    }
}

/// Build the application router, starting the Worker Pool's subscription
/// loops as a side effect (spec §2 "F Worker Pool", §5 "parallel workers
/// over a shared process").
pub async fn create_app(config: Config, pool: PgPool) -> Result<Router, anyhow::Error> {
    let auth_config = AuthConfig {
        jwt_secret: config.jwt_secret.clone(),
        issuer: std::env::var("JWT_ISSUER").ok(),
        audience: std::env::var("JWT_AUDIENCE").ok(),
    };
    let auth_backend = AuthBackend::new(pool.clone(), auth_config);

    let rooms = Arc::new(RoomRegistry::new());
    let fabric: Arc<dyn studio_realtime::EventFabric> = rooms.clone();

    let storage_config = StorageConfig {
        provider: std::env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "s3".to_string()),
        bucket: config.s3_bucket.clone(),
        public_base_url: config.s3_public_base_url.clone(),
        allowed_download_hosts: config.allowed_download_hosts.clone(),
    };
    let storage = Arc::<dyn studio_storage::ObjectStore>::from(
        StorageServiceFactory::create(storage_config).map_err(|e| anyhow::anyhow!(e))?,
    );

    let provider_config = ProviderConfig {
        provider: std::env::var("PROVIDER").unwrap_or_else(|_| "gemini".to_string()),
        api_key: config.provider_api_key.clone(),
        base_url: std::env::var("PROVIDER_BASE_URL").ok(),
        default_model: config.default_model.clone(),
        rate_limit_window_secs: config.rate_limit_window_secs,
        rate_limit_max_requests: config.rate_limit_max_requests,
    };
    let provider = ProviderServiceFactory::create(provider_config).map_err(|e| anyhow::anyhow!(e))?;

    let queue_config = QueueConfig {
        provider: std::env::var("QUEUE_PROVIDER").unwrap_or_else(|_| "postgres".to_string()),
        database_url: config.database_url.clone(),
    };
    let queue = QueueServiceFactory::create(queue_config, Some(pool.clone()))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let ledger_repo = LedgerRepository::new(pool.clone());
    let ledger = TokenLedger::new(ledger_repo.clone(), fabric.clone());

    let generations_repo = GenerationsRepository::new(pool.clone());
    let operation_types = OperationTypeRepository::new(pool.clone());
    let prompt_templates = PromptTemplateRepository::new(pool.clone());
    let uploads = UploadRepository::new(pool.clone());

    let processor: Arc<dyn JobProcessor> = Arc::new(GenerationProcessor::new(
        generations_repo.clone(),
        operation_types.clone(),
        prompt_templates,
        uploads.clone(),
        ledger.clone(),
        ledger_repo,
        storage.clone(),
        provider,
        fabric,
    ));

    let worker_concurrency: usize = std::env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    queue
        .subscribe(
            IMAGE_GENERATION_QUEUE,
            processor,
            SubscribeOptions {
                concurrency: worker_concurrency,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let ledger_state = studio_ledger::LedgerState {
        ledger,
        auth: auth_backend.clone(),
        signup_bonus_amount: config.signup_bonus_amount,
    };

    let generations_state = studio_generations::GenerationsState {
        repo: generations_repo,
        operation_types,
        uploads,
        storage,
        queue,
        auth: auth_backend.clone(),
    };

    let realtime_state = RealtimeState {
        auth: auth_backend,
        rooms,
    };

    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route(
            "/",
            axum::routing::get(|| async { "Studio image-generation API" }),
        )
        .merge(studio_ledger::routes().with_state(ledger_state))
        .merge(studio_generations::routes().with_state(generations_state))
        .route(
            "/realtime",
            axum::routing::get(studio_realtime::ws::handler::<RealtimeState>),
        )
        .with_state(realtime_state);

    Ok(app)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Permissive in dev, origin-restricted in production. Grounded on the
/// teacher's lambda entrypoint expecting a `build_cors_layer` helper its
/// own `lib.rs` never defined — filled in here against
/// `CORS_ALLOWED_ORIGINS` (spec §6 configuration table).
pub fn build_cors_layer(origins: &str) -> CorsLayer {
    let allowed: Vec<axum::http::HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Caps request bodies (multipart image uploads) at 25 MiB.
pub fn body_limit_layer() -> tower_http::limit::RequestBodyLimitLayer {
    tower_http::limit::RequestBodyLimitLayer::new(25 * 1024 * 1024)
}
