//! Application setup and server configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use destination_client::DestinationClient;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::common::AppState;
use crate::config::Config;
use crate::domains::auth::JwtService;
use crate::kernel::{
    BaseDestinationService, BaseFormationStore, DestinationAdapter, EngineSettings,
    HttpWebhookClient, InMemoryFormationStore, PostgresFormationStore, ServerDeps,
    UnconfiguredDestinationService,
};
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{formations, health_handler, status};

/// Status API request bodies are small JSON documents
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Build the engine dependencies from configuration.
///
/// Connects to PostgreSQL and runs migrations when `DATABASE_URL` is set,
/// otherwise keeps everything in memory.
pub async fn build_deps(config: &Config) -> Result<ServerDeps> {
    let store: Arc<dyn BaseFormationStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("Failed to connect to database")?;

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            Arc::new(PostgresFormationStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(InMemoryFormationStore::new())
        }
    };

    let destination_service: Arc<dyn BaseDestinationService> = match (
        &config.destination_service_url,
        &config.destination_service_token,
    ) {
        (Some(url), Some(token)) => Arc::new(DestinationAdapter::new(Arc::new(
            DestinationClient::new(url.clone(), token.clone()),
        ))),
        _ => {
            warn!("Destination service not configured, destination operators will fail");
            Arc::new(UnconfiguredDestinationService)
        }
    };

    let webhook_client = Arc::new(HttpWebhookClient::new(config.webhook_timeout)?);

    Ok(ServerDeps::new(
        store,
        webhook_client,
        destination_service,
        EngineSettings {
            config_pending_resend_limit: config.config_pending_resend_limit,
        },
    ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps, jwt_service: Arc<JwtService>, allowed_origins: &[String]) -> Router {
    let app_state = AppState::new(deps, jwt_service.clone());

    let status_routes = Router::new()
        .route(
            "/v1/businessIntegrations/:formation_id/assignments/:assignment_id/status",
            patch(status::assignment_status_handler),
        )
        .route(
            "/v1/businessIntegrations/:formation_id/assignments/:assignment_id/status/reset",
            patch(status::assignment_status_reset_handler),
        )
        .route(
            "/v1/businessIntegrations/:formation_id/status",
            patch(status::formation_status_handler),
        );

    let formation_routes = Router::new()
        .route("/v1/formations", post(formations::create_formation_handler))
        .route(
            "/v1/formations/:formation_id",
            delete(formations::delete_formation_handler),
        )
        .route(
            "/v1/formations/:formation_id/participants",
            post(formations::assign_participant_handler),
        )
        .route(
            "/v1/formations/:formation_id/participants/:participant_id",
            delete(formations::unassign_participant_handler),
        )
        .route(
            "/v1/formations/:formation_id/resynchronize",
            post(formations::resynchronize_handler),
        )
        .route(
            "/v1/formations/:formation_id/status",
            get(formations::formation_status_handler),
        )
        .route(
            "/v1/formations/:formation_id/assignments",
            get(formations::list_assignments_handler),
        )
        .route(
            "/v1/formations/:formation_id/notifications",
            get(formations::list_notifications_handler),
        );

    Router::new()
        .merge(status_routes)
        .merge(formation_routes)
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt_service.clone(), req, next)
        }))
        // Health check (no auth)
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(Extension(app_state))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
