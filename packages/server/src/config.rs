use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string; the in-memory store is used without it
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub webhook_timeout: Duration,
    pub config_pending_resend_limit: u32,
    pub destination_service_url: Option<String>,
    pub destination_service_token: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "formation-engine".to_string()),
            webhook_timeout: Duration::from_secs(
                env::var("WEBHOOK_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .context("WEBHOOK_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            config_pending_resend_limit: env::var("CONFIG_PENDING_RESEND_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("CONFIG_PENDING_RESEND_LIMIT must be a non-negative number")?,
            destination_service_url: env::var("DESTINATION_SERVICE_URL").ok(),
            destination_service_token: env::var("DESTINATION_SERVICE_TOKEN").ok(),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
