//! End-to-end webhook ingestion tests with mocked external APIs.
//! Exercises the full merge → generate → write-back → activity flow without
//! hitting real services.
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_outreach_api::config::Config;
use rust_outreach_api::crm_client::CrmClient;
use rust_outreach_api::email_generator::EmailGenerator;
use rust_outreach_api::handlers::{self, AppState};
use rust_outreach_api::models::ActivityKind;
use rust_outreach_api::store::AppStore;
use rust_outreach_api::webhook_handler::{
    account_webhook, lead_realtime_webhook, lead_webhook,
};

fn test_config(openai_url: &str, ampersand_url: &str) -> Config {
    Config {
        port: 3001,
        openai_api_key: "test-openai-key".to_string(),
        openai_base_url: openai_url.to_string(),
        openai_model: "gpt-4-turbo-preview".to_string(),
        ampersand_api_key: "test-amp-key".to_string(),
        ampersand_write_url: ampersand_url.to_string(),
        ampersand_read_url: ampersand_url.to_string(),
        ampersand_project: Some("proj-1".to_string()),
        installation_id: Some("inst-1".to_string()),
        group_ref: Some("acme-corp".to_string()),
        log_dir: std::env::temp_dir().display().to_string(),
    }
}

fn build_state(openai_url: &str, ampersand_url: &str) -> Arc<AppState> {
    let config = test_config(openai_url, ampersand_url);
    let generator = EmailGenerator::from_config(&config).unwrap();
    let crm = CrmClient::from_config(&config).unwrap();
    Arc::new(AppState {
        config,
        store: AppStore::new(),
        generator,
        crm,
    })
}

async fn mount_openai_success(server: &MockServer) {
    let content = json!({
        "subject": "Quick note for Ana",
        "body": "Hello Ana, saw Acme is growing...",
        "score": 88,
        "insights": ["growth stage", "role fit"]
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": content}}]
        })))
        .mount(server)
        .await;
}

async fn mount_write_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/projects/proj-1/integrations/inst-1/objects/lead"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "ok"})))
        .mount(server)
        .await;
}

fn lead_batch_payload(items: Vec<Value>) -> Value {
    json!({"objectName": "lead", "result": items})
}

fn assigned_lead_item() -> Value {
    json!({
        "fields": {
            "id": "00Q1",
            "firstname": "Ana",
            "lastname": "Lee",
            "company": "Acme",
            "ownerid": "005X"
        },
        "mappedFields": {}
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn backfill_generates_and_writes_back() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    mount_openai_success(&openai).await;
    mount_write_success(&ampersand).await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![assigned_lead_item()]);

    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["processed"], json!(1));

    let lead = state.store.get_lead("00Q1").await.unwrap();
    let email = lead.ai_email.unwrap();
    assert_eq!(email.subject, "Quick note for Ana");
    assert_eq!(email.score, 88.0);

    let activities = state.store.recent_activities(5).await;
    assert_eq!(activities[0].kind, ActivityKind::Success);
    assert_eq!(activities[0].lead_id.as_deref(), Some("00Q1"));
}

#[tokio::test]
async fn redelivery_with_mapped_subject_skips_generation() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    // Neither external service may be called on redelivery
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/proj-1/integrations/inst-1/objects/lead"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ampersand)
        .await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![json!({
        "fields": {
            "id": "00Q1",
            "firstname": "Ana",
            "lastname": "Lee",
            "company": "Acme",
            "ownerid": "005X"
        },
        "mappedFields": {"outreach_subject": "Hi Ana"}
    })]);

    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let lead = state.store.get_lead("00Q1").await.unwrap();
    assert_eq!(lead.ai_email.unwrap().subject, "Hi Ana");
}

#[tokio::test]
async fn unassigned_lead_never_triggers_generation() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&openai)
        .await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![json!({
        "fields": {"id": "00Q2", "firstname": "Bo", "company": "Beta"},
        "mappedFields": {}
    })]);

    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let lead = state.store.get_lead("00Q2").await.unwrap();
    assert!(lead.ai_email.is_none());
}

#[tokio::test]
async fn wrong_object_is_a_noop_success() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    let state = build_state(&openai.uri(), &ampersand.uri());

    let payload = json!({"objectName": "account", "result": [assigned_lead_item()]});
    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], &b"Not leads"[..]);

    assert_eq!(state.store.lead_count().await, 0);
}

#[tokio::test]
async fn malformed_envelope_is_rejected_without_side_effects() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    let state = build_state(&openai.uri(), &ampersand.uri());

    let payload = json!({"objectName": "lead", "result": "not-an-array"});
    let err = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.store.lead_count().await, 0);
    assert_eq!(state.store.activity_count().await, 0);
}

#[tokio::test]
async fn malformed_item_is_skipped_without_aborting_batch() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    mount_openai_success(&openai).await;
    mount_write_success(&ampersand).await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![
        json!({"fields": {"firstname": "NoId"}, "mappedFields": {}}),
        assigned_lead_item(),
    ]);

    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    let body = body_json(response).await;
    // Batch response reports the full item count
    assert_eq!(body["processed"], json!(2));

    assert_eq!(state.store.lead_count().await, 1);
    assert!(state.store.get_lead("00Q1").await.unwrap().ai_email.is_some());
}

#[tokio::test]
async fn write_failure_is_recorded_and_batch_continues() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    mount_openai_success(&openai).await;
    Mock::given(method("POST"))
        .and(path("/projects/proj-1/integrations/inst-1/objects/lead"))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({"causes": ["backend down"]})),
        )
        .mount(&ampersand)
        .await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![
        assigned_lead_item(),
        json!({
            "fields": {"id": "00Q3", "firstname": "Cy", "company": "Gamma", "ownerid": "005Y"},
            "mappedFields": {}
        }),
    ]);

    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["processed"], json!(2));

    // Both leads stored, neither annotated (the write never landed)
    assert!(state.store.get_lead("00Q1").await.unwrap().ai_email.is_none());
    assert!(state.store.get_lead("00Q3").await.unwrap().ai_email.is_none());

    let activities = state.store.recent_activities(10).await;
    let errors: Vec<_> = activities
        .iter()
        .filter(|a| a.kind == ActivityKind::Error)
        .collect();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn generation_failure_falls_back_and_still_writes() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&openai)
        .await;
    mount_write_success(&ampersand).await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![assigned_lead_item()]);

    let response = lead_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let email = state.store.get_lead("00Q1").await.unwrap().ai_email.unwrap();
    assert!(email.subject.contains("Ana"));
    assert!(email.subject.contains("Acme"));
    assert!(email.body.contains("Ana"));
    assert!(email.body.contains("Acme"));
    assert_eq!(email.score, 75.0);
}

#[tokio::test]
async fn realtime_reports_counts_and_request_id() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    mount_openai_success(&openai).await;
    mount_write_success(&ampersand).await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = json!({
        "objectName": "lead",
        "projectId": "proj-1",
        "groupRef": "acme-corp",
        "result": [
            assigned_lead_item(),
            {
                "fields": {"id": "00Q4", "firstname": "Di", "company": "Delta"},
                "mappedFields": {},
                "subscribeEventType": "update"
            }
        ]
    });

    let response = lead_realtime_webhook(State(state.clone()), Json(payload)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["processed"], json!(2));
    assert_eq!(body["emailsGenerated"], json!(1));
    assert!(body["requestId"].as_str().unwrap().starts_with("realtime-"));
    assert!(body["duration"].is_number());
}

#[tokio::test]
async fn account_backfill_stores_accounts() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    let state = build_state(&openai.uri(), &ampersand.uri());

    let payload = json!({
        "objectName": "account",
        "result": [
            {"fields": {"id": "001A", "name": "Acme", "industry": "Technology"}},
            {"fields": {"name": "NoId Inc"}}
        ]
    });

    let response = account_webhook(State(state.clone()), Json(payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["processed"], json!(2));
    assert_eq!(state.store.account_count().await, 1);
}

#[tokio::test]
async fn state_projection_shape_and_order() {
    let openai = MockServer::start().await;
    let ampersand = MockServer::start().await;
    mount_openai_success(&openai).await;
    mount_write_success(&ampersand).await;

    let state = build_state(&openai.uri(), &ampersand.uri());
    let payload = lead_batch_payload(vec![
        json!({
            "fields": {"id": "old", "firstname": "Old", "createddate": "2025-01-01T00:00:00Z"},
            "mappedFields": {}
        }),
        json!({
            "fields": {"id": "new", "firstname": "New", "createddate": "2025-06-01T00:00:00Z"},
            "mappedFields": {}
        }),
    ]);
    lead_webhook(State(state.clone()), Json(payload)).await.unwrap();

    let response = handlers::get_state(State(state.clone())).await.into_response();
    let body = body_json(response).await;

    let leads = body["leads"].as_array().unwrap();
    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0]["id"], json!("new"));
    assert_eq!(leads[1]["id"], json!("old"));
    assert_eq!(leads[0]["industry"], json!("Technology"));
    assert_eq!(leads[0]["assignedTo"], json!("Unassigned"));
    assert!(leads[0]["responseStatus"].is_null());

    let activities = body["activities"].as_array().unwrap();
    assert!(!activities.is_empty());
    assert!(activities.len() <= 20);
}
