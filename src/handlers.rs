use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::Config;
use crate::crm_client::CrmClient;
use crate::email_generator::EmailGenerator;
use crate::errors::ResultExt;
use crate::models::{ActivityKind, LeadView, StateResponse};
use crate::store::AppStore;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// In-memory lead/account store and activity feed.
    pub store: AppStore,
    /// Outreach email generator.
    pub generator: EmailGenerator,
    /// Integration platform client for CRM reads and write-backs.
    pub crm: CrmClient,
}

/// Health check endpoint.
///
/// Returns the service status plus store counters.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "rust-outreach-api",
            "version": env!("CARGO_PKG_VERSION"),
            "leads": state.store.lead_count().await,
            "accounts": state.store.account_count().await,
            "activities": state.store.activity_count().await,
        })),
    )
}

/// GET /api/state
///
/// Read-only projection of the lead store and activity feed for the polling
/// dashboard. Leads come sorted by creation time descending; only the 20
/// most recent activities are included. Triggers no side effects.
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let leads = state
        .store
        .leads_snapshot()
        .await
        .iter()
        .map(LeadView::from)
        .collect();
    let activities = state.store.recent_activities(20).await;

    Json(StateResponse { leads, activities })
}

/// POST /api/trigger-read
///
/// Ask the integration platform to (re)sync lead records. Requires the
/// project and installation ids to be configured.
pub async fn trigger_read(State(state): State<Arc<AppState>>) -> Response {
    let result = async {
        let project_id = state.config.ampersand_project.as_deref().ok_or_else(|| {
            crate::errors::AppError::InternalError(
                "Missing required env vars: AMPERSAND_PROJECT or INSTALLATION_ID".to_string(),
            )
        })?;
        let installation_id = state.config.installation_id.as_deref().ok_or_else(|| {
            crate::errors::AppError::InternalError(
                "Missing required env vars: AMPERSAND_PROJECT or INSTALLATION_ID".to_string(),
            )
        })?;
        let group_ref = state.config.group_ref.as_deref().unwrap_or("acme-corp");

        state
            .crm
            .trigger_read(project_id, installation_id, group_ref)
            .await
            .context("Manual sync trigger")
    }
    .await;

    match result {
        Ok(()) => {
            state
                .store
                .push_activity(
                    ActivityKind::Success,
                    "Manual sync triggered successfully",
                    None,
                )
                .await;
            Json(json!({"success": true})).into_response()
        }
        Err(e) => {
            tracing::error!("Trigger read failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to trigger read"})),
            )
                .into_response()
        }
    }
}
