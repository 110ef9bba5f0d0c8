use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::ActivityKind;
use crate::webhook_models::{
    check_envelope, AccountWebhookItem, BatchWebhookResponse, EnvelopeCheck, EnvelopeMeta,
    LeadWebhookItem, RealtimeWebhookResponse,
};

/// POST /webhooks/leadWebhook
///
/// Batch lead backfill from the integration platform. Items are processed
/// strictly in order, each awaited to completion; a single lead's failure
/// never aborts the batch. The response is returned only after every item
/// has been attempted.
pub async fn lead_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    append_raw_log(&state.config.log_dir, "lead_backfill.log", &payload).await;

    let items = match check_envelope(&payload, "lead") {
        EnvelopeCheck::Malformed(msg) => {
            tracing::error!("Invalid backfill payload - missing result array");
            return Err(AppError::BadRequest(msg.to_string()));
        }
        EnvelopeCheck::WrongObject(name) => {
            state
                .store
                .push_activity(
                    ActivityKind::WebhookReceived,
                    format!("Received non-lead batch: {}", name.unwrap_or("unknown")),
                    None,
                )
                .await;
            return Ok((StatusCode::OK, "Not leads").into_response());
        }
        EnvelopeCheck::Ok(items) => items,
    };

    state
        .store
        .push_activity(
            ActivityKind::WebhookReceived,
            format!("Received backfill batch of {} leads", items.len()),
            None,
        )
        .await;

    let meta = EnvelopeMeta::from_payload(&payload);
    process_lead_items(&state, items, &meta, None).await;

    Ok((
        StatusCode::OK,
        Json(BatchWebhookResponse {
            success: true,
            processed: items.len(),
        }),
    )
        .into_response())
}

/// POST /webhooks/accountWebhook
///
/// Batch account backfill. Accounts are stored as-is; no generation is
/// triggered for them.
pub async fn account_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Response, AppError> {
    append_raw_log(&state.config.log_dir, "account_backfill.log", &payload).await;

    let items = match check_envelope(&payload, "account") {
        EnvelopeCheck::Malformed(msg) => {
            tracing::error!("Invalid backfill payload - missing result array");
            return Err(AppError::BadRequest(msg.to_string()));
        }
        EnvelopeCheck::WrongObject(name) => {
            state
                .store
                .push_activity(
                    ActivityKind::WebhookReceived,
                    format!("Received non-account batch: {}", name.unwrap_or("unknown")),
                    None,
                )
                .await;
            return Ok((StatusCode::OK, "Not accounts").into_response());
        }
        EnvelopeCheck::Ok(items) => items,
    };

    state
        .store
        .push_activity(
            ActivityKind::WebhookReceived,
            format!("Received backfill batch of {} accounts", items.len()),
            None,
        )
        .await;

    for item in items {
        let item: AccountWebhookItem = match serde_json::from_value(item.clone()) {
            Ok(item) => item,
            Err(e) => {
                tracing::error!("Skipping malformed account in batch: {}", e);
                continue;
            }
        };
        let Some(account) = item.fields.and_then(|f| f.into_account()) else {
            tracing::error!("Skipping invalid account in batch: missing id");
            continue;
        };
        tracing::info!(
            "Processing backfilled account: {} ({})",
            account.name.as_deref().unwrap_or("Unknown"),
            account.id
        );
        state.store.upsert_account(account).await;
    }

    Ok((
        StatusCode::OK,
        Json(BatchWebhookResponse {
            success: true,
            processed: items.len(),
        }),
    )
        .into_response())
}

/// POST /webhooks/leadRealtimeWebhook
///
/// Real-time lead events (assignments). Same contract as the batch webhook
/// apart from verbose per-request logging and the richer response body.
pub async fn lead_realtime_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Response {
    let start = Instant::now();
    let request_id = format!("realtime-{}", Uuid::new_v4().simple());

    tracing::info!("[{}] Real-time webhook received", request_id);

    let log_entry = json!({
        "requestId": request_id,
        "timestamp": Utc::now().to_rfc3339(),
        "body": payload,
    });
    append_raw_log(&state.config.log_dir, "lead_realtime.log", &log_entry).await;

    match realtime_inner(&state, &payload, &request_id).await {
        Ok(response) => {
            let duration = start.elapsed().as_millis();
            match response {
                RealtimeOutcome::NotLeads => (StatusCode::OK, "Not leads").into_response(),
                RealtimeOutcome::Done(stats) => {
                    tracing::info!(
                        "[{}] Real-time webhook processing completed: {}ms, {} processed, {} emails",
                        request_id,
                        duration,
                        stats.processed,
                        stats.emails_generated
                    );
                    (
                        StatusCode::OK,
                        Json(RealtimeWebhookResponse {
                            success: true,
                            request_id,
                            processed: stats.processed,
                            emails_generated: stats.emails_generated,
                            duration,
                        }),
                    )
                        .into_response()
                }
            }
        }
        Err(AppError::BadRequest(msg)) => {
            tracing::error!("[{}] Invalid real-time payload: {}", request_id, msg);
            AppError::BadRequest(msg).into_response()
        }
        Err(e) => {
            let duration = start.elapsed().as_millis();
            tracing::error!(
                "[{}] Real-time webhook failed after {}ms: {}",
                request_id,
                duration,
                e
            );
            state
                .store
                .push_activity(
                    ActivityKind::Error,
                    format!("Real-time webhook processing failed: {}", e),
                    None,
                )
                .await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": e.to_string(),
                    "requestId": request_id,
                    "duration": duration,
                })),
            )
                .into_response()
        }
    }
}

enum RealtimeOutcome {
    NotLeads,
    Done(BatchStats),
}

async fn realtime_inner(
    state: &AppState,
    payload: &Value,
    request_id: &str,
) -> Result<RealtimeOutcome, AppError> {
    let items = match check_envelope(payload, "lead") {
        EnvelopeCheck::Malformed(msg) => {
            return Err(AppError::BadRequest(msg.to_string()));
        }
        EnvelopeCheck::WrongObject(name) => {
            tracing::info!(
                "[{}] Skipping non-lead object: {}",
                request_id,
                name.unwrap_or("unknown")
            );
            state
                .store
                .push_activity(
                    ActivityKind::WebhookReceived,
                    format!(
                        "Received non-lead real-time update: {}",
                        name.unwrap_or("unknown")
                    ),
                    None,
                )
                .await;
            return Ok(RealtimeOutcome::NotLeads);
        }
        EnvelopeCheck::Ok(items) => items,
    };

    let meta = EnvelopeMeta::from_payload(payload);
    tracing::info!(
        "[{}] Real-time webhook details: action={:?} provider={:?} groupRef={:?} projectId={:?} installationId={:?} numRecords={}",
        request_id,
        meta.action,
        meta.provider,
        meta.group_ref,
        meta.project_id,
        meta.installation_id,
        items.len()
    );

    state
        .store
        .push_activity(
            ActivityKind::WebhookReceived,
            format!("Received real-time batch of {} lead updates", items.len()),
            None,
        )
        .await;

    let stats = process_lead_items(state, items, &meta, Some(request_id)).await;
    Ok(RealtimeOutcome::Done(stats))
}

/// Counters for one webhook batch.
#[derive(Debug, Default)]
pub struct BatchStats {
    /// Well-formed items merged into the store.
    pub processed: usize,
    /// Items that actually went through generation and write-back.
    pub emails_generated: usize,
}

/// Merge a batch of lead items into the store, generating and writing back
/// emails where the gate allows, strictly in array order.
///
/// The generation gate is: owner assigned AND no outreach subject mapped back
/// yet. It deliberately checks only the delivered item, not concurrently
/// in-flight generations for the same lead (see DESIGN.md).
async fn process_lead_items(
    state: &AppState,
    items: &[Value],
    meta: &EnvelopeMeta,
    request_id: Option<&str>,
) -> BatchStats {
    let mut stats = BatchStats::default();
    let realtime = request_id.is_some();
    let tag = request_id.unwrap_or("backfill");

    for item in items {
        let item: LeadWebhookItem = match serde_json::from_value(item.clone()) {
            Ok(item) => item,
            Err(e) => {
                tracing::error!("[{}] Skipping malformed lead in batch: {}", tag, e);
                continue;
            }
        };
        let Some(fields) = item.fields else {
            tracing::error!("[{}] Skipping invalid lead in batch: missing fields", tag);
            continue;
        };
        let Some(lead_id) = fields.id.clone().filter(|id| !id.trim().is_empty()) else {
            tracing::error!("[{}] Skipping invalid lead in batch: missing id", tag);
            continue;
        };

        let name = fields.display_name();
        tracing::info!(
            "[{}] Processing lead: {} ({}) owner={} hasExistingEmail={}",
            tag,
            name,
            lead_id,
            fields.ownerid.as_deref().unwrap_or("Unassigned"),
            item.mapped_fields.has_outreach_subject()
        );

        // Replace-on-write merge; a mapped outreach subject folds straight
        // into the stored annotation (idempotency guard for redelivery).
        let stored_email = item.mapped_fields.to_ai_email();
        if let Some(lead) = fields.clone().into_lead(stored_email) {
            state.store.upsert_lead(lead).await;
        }
        stats.processed += 1;

        if !fields.is_assigned() {
            tracing::debug!(
                "[{}] Lead {} not assigned to owner, skipping email generation",
                tag,
                lead_id
            );
            continue;
        }
        if item.mapped_fields.has_outreach_subject() {
            tracing::debug!("[{}] Lead {} already has email, skipping generation", tag, lead_id);
            continue;
        }

        let message = if realtime {
            format!("Generating real-time email for {}", name)
        } else {
            format!("Generating email for {}", name)
        };
        state
            .store
            .push_activity(ActivityKind::AiGenerating, message, Some(lead_id.clone()))
            .await;

        let email = state.generator.generate(&fields).await;

        let project_id = meta
            .project_id
            .as_deref()
            .or(state.config.ampersand_project.as_deref());
        let installation_id = state.config.installation_id.as_deref();
        let group_ref = meta
            .group_ref
            .as_deref()
            .or(state.config.group_ref.as_deref())
            .unwrap_or("acme-corp");

        match state
            .crm
            .update_lead(project_id, installation_id, group_ref, &lead_id, &email)
            .await
        {
            Ok(()) => {
                state
                    .store
                    .attach_email(
                        &lead_id,
                        crate::models::AiEmail {
                            subject: email.subject.clone(),
                            body: email.body.clone(),
                            score: email.score,
                            personalizations: email.insights.clone(),
                        },
                    )
                    .await;
                stats.emails_generated += 1;

                let message = if realtime {
                    format!(
                        "Real-time email generated for {} (Score: {}/100)",
                        name, email.score
                    )
                } else {
                    format!("Email generated for {} (Score: {}/100)", name, email.score)
                };
                state
                    .store
                    .push_activity(ActivityKind::Success, message, Some(lead_id.clone()))
                    .await;
            }
            Err(e) => {
                tracing::error!("[{}] Failed to process lead {}: {}", tag, lead_id, e);
                let message = if realtime {
                    format!("Failed to generate real-time email for lead {}: {}", lead_id, e)
                } else {
                    format!("Failed to generate email for lead {}", lead_id)
                };
                state
                    .store
                    .push_activity(ActivityKind::Error, message, Some(lead_id.clone()))
                    .await;
            }
        }
    }

    stats
}

/// Append the raw payload, pretty-printed, to an append-only log file under
/// the configured logs directory. Raw-input durability is independent of the
/// in-memory processing outcome; failures here are logged and ignored.
async fn append_raw_log(log_dir: &str, file_name: &str, payload: &Value) {
    let pretty =
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    let path = std::path::Path::new(log_dir).join(file_name);

    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(pretty.as_bytes()).await?;
        file.write_all(b"\n\n").await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to append raw payload to {}: {}", path.display(), e);
    }
}
