//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL, also backs the durable job queue.
    pub database_url: String,

    /// Generative provider API key (image model backend).
    pub provider_api_key: String,

    /// Shared-secret used to validate inbound JWTs minted by the external
    /// auth system. We never issue tokens ourselves, only verify them.
    pub jwt_secret: String,

    /// Object storage
    pub s3_bucket: String,
    pub s3_public_base_url: String,

    /// Hosts the intake controller will accept `sourceImageUrl`/reference
    /// image downloads from.
    pub allowed_download_hosts: Vec<String>,

    /// Default model identifier passed to the provider adapter when a
    /// request does not specify one.
    pub default_model: String,

    /// Per-user sliding window rate limit applied to intake requests.
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,

    /// Token balance credited to a user on their first ledger entry.
    pub signup_bonus_amount: i64,

    /// Runtime configuration
    pub port: u16,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,

            provider_api_key: env::var("PROVIDER_API_KEY")
                .map_err(|_| anyhow::anyhow!("PROVIDER_API_KEY is required"))?,

            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET is required"))?,

            s3_bucket: env::var("S3_BUCKET").map_err(|_| anyhow::anyhow!("S3_BUCKET is required"))?,
            s3_public_base_url: env::var("S3_PUBLIC_BASE_URL")
                .map_err(|_| anyhow::anyhow!("S3_PUBLIC_BASE_URL is required"))?,

            allowed_download_hosts: env::var("ALLOWED_DOWNLOAD_HOSTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            default_model: env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| "sdxl-base-1.0".to_string()),

            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            rate_limit_max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            signup_bonus_amount: env::var("SIGNUP_BONUS_AMOUNT")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(config)
    }
}
