use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;

use crate::config::Config;
use crate::email_generator::GeneratedEmail;
use crate::errors::AppError;

/// Fixed lower bound for manual sync requests; the platform replays records
/// modified after this point.
const READ_SINCE_TIMESTAMP: &str = "2025-07-10T00:00:00.000Z";

/// Client for the integration platform's read and write endpoints.
///
/// Writes map a generated email onto four fixed custom fields of the CRM
/// lead record. Write failures are surfaced to the caller, never swallowed:
/// a failed write means the CRM never learns about the generated email.
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    write_base_url: String,
    read_base_url: String,
}

impl CrmClient {
    pub fn new(
        write_base_url: String,
        read_base_url: String,
        api_key: &str,
    ) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| AppError::InternalError(format!("Invalid API key header: {}", e)))?;
        key.set_sensitive(true);
        headers.insert("X-Api-Key", key);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create CRM client: {}", e))
            })?;

        Ok(Self {
            client,
            write_base_url,
            read_base_url,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.ampersand_write_url.clone(),
            config.ampersand_read_url.clone(),
            &config.ampersand_api_key,
        )
    }

    /// Push a generated email's fields onto the CRM lead record.
    ///
    /// Fails fast with a validation error naming every missing parameter
    /// before attempting any write.
    pub async fn update_lead(
        &self,
        project_id: Option<&str>,
        installation_id: Option<&str>,
        group_ref: &str,
        lead_id: &str,
        email: &GeneratedEmail,
    ) -> Result<(), AppError> {
        let mut missing = Vec::new();
        let project_id = non_empty(project_id).unwrap_or_else(|| {
            missing.push("projectId");
            ""
        });
        let installation_id = non_empty(installation_id).unwrap_or_else(|| {
            missing.push("integrationId");
            ""
        });
        if group_ref.trim().is_empty() {
            missing.push("groupRef");
        }
        if lead_id.trim().is_empty() {
            missing.push("leadId");
        }
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Missing required parameters for CRM update: {}",
                missing.join(", ")
            )));
        }

        let url = format!(
            "{}/projects/{}/integrations/{}/objects/lead",
            self.write_base_url, project_id, installation_id
        );
        let payload = json!({
            "groupRef": group_ref,
            "type": "update",
            "record": {
                "id": lead_id,
                "outreach_subject": email.subject,
                "outreach_body": email.body,
                "outreach_score": email.score,
                "outreach_personalization_notes": email.insights.join("\n"),
            }
        });

        tracing::info!("Updating CRM lead {} via {}", lead_id, url);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("CRM write failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if let Ok(details) = serde_json::from_str::<serde_json::Value>(&body) {
                if let Some(causes) = details.get("causes") {
                    tracing::error!("CRM write error causes for lead {}: {}", lead_id, causes);
                }
            }
            return Err(AppError::ExternalApiError(format!(
                "CRM write for lead {} returned {}: {}",
                lead_id, status, body
            )));
        }

        tracing::info!("Updated CRM lead {} - Response: {}", lead_id, response.status());
        Ok(())
    }

    /// Ask the integration platform to (re)read lead records asynchronously.
    pub async fn trigger_read(
        &self,
        project_id: &str,
        installation_id: &str,
        group_ref: &str,
    ) -> Result<(), AppError> {
        let url = format!(
            "{}/projects/{}/integrations/{}/objects/lead",
            self.read_base_url, project_id, installation_id
        );
        let payload = json!({
            "groupRef": group_ref,
            "mode": "async",
            "sinceTimestamp": READ_SINCE_TIMESTAMP,
        });

        tracing::info!("Triggering read via {}", url);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Read trigger failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Read trigger returned {}: {}",
                status, body
            )));
        }

        tracing::info!("Read trigger response: {}", response.status());
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
