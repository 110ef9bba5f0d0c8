mod config;
mod crm_client;
mod email_generator;
mod errors;
mod handlers;
mod models;
mod store;
mod webhook_handler;
mod webhook_models;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::crm_client::CrmClient;
use crate::email_generator::EmailGenerator;
use crate::store::AppStore;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the in-memory store and external
/// clients, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_outreach_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Raw webhook payloads are appended here before any validation
    tokio::fs::create_dir_all(&config.log_dir).await?;
    tracing::info!("Raw payload log directory: {}", config.log_dir);

    let generator = EmailGenerator::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize email generator: {}", e))?;
    let crm = CrmClient::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize CRM client: {}", e))?;

    // Build application state. The store lives exactly as long as the
    // process; nothing is persisted across restarts.
    let app_state = Arc::new(handlers::AppState {
        config: config.clone(),
        store: AppStore::new(),
        generator,
        crm,
    });

    let app = Router::new()
        .route("/health", get(handlers::health))
        // Webhook endpoints
        .route("/webhooks/leadWebhook", post(webhook_handler::lead_webhook))
        .route(
            "/webhooks/accountWebhook",
            post(webhook_handler::account_webhook),
        )
        .route(
            "/webhooks/leadRealtimeWebhook",
            post(webhook_handler::lead_realtime_webhook),
        )
        // Dashboard API
        .route("/api/state", get(handlers::get_state))
        .route("/api/trigger-read", post(handlers::trigger_read))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 10MB max payload (large webhook batches)
                .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Lead backfill webhook:   POST /webhooks/leadWebhook");
    tracing::info!("Account backfill webhook: POST /webhooks/accountWebhook");
    tracing::info!("Real-time lead webhook:  POST /webhooks/leadRealtimeWebhook");
    tracing::info!("Dashboard state API:     GET  /api/state");

    axum::serve(listener, app).await?;

    Ok(())
}
