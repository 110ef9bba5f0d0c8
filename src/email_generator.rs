use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::errors::AppError;
use crate::webhook_models::LeadFields;

/// Whether a generated email came from the model or the deterministic
/// fallback template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationSource {
    Model,
    Fallback,
}

/// Outcome of a generation call. Always usable; `source` tells callers
/// whether the model actually produced it.
#[derive(Debug, Clone)]
pub struct GeneratedEmail {
    pub subject: String,
    pub body: String,
    pub score: f64,
    pub insights: Vec<String>,
    pub source: GenerationSource,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// The JSON shape the model is instructed to return.
#[derive(Debug, Deserialize)]
struct EmailDraft {
    subject: String,
    body: String,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    insights: Vec<String>,
}

/// Generates personalized outreach emails through a chat-completion call.
///
/// Never fails: any transport or parse error is absorbed by a deterministic
/// template built from the lead's own fields, so the caller always receives
/// a usable result and the CRM write step is never skipped.
#[derive(Clone)]
pub struct EmailGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmailGenerator {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create OpenAI client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )
    }

    /// Generate an outreach email for the lead, falling back to the template
    /// when the model call fails in any way.
    pub async fn generate(&self, lead: &LeadFields) -> GeneratedEmail {
        match self.call_model(lead).await {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(
                    "AI generation failed for lead {}: {}. Using fallback template",
                    lead.id.as_deref().unwrap_or("unknown"),
                    e
                );
                fallback_email(lead)
            }
        }
    }

    async fn call_model(&self, lead: &LeadFields) -> Result<GeneratedEmail, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_prompt(lead),
            }],
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
            temperature: 0.7,
        };

        tracing::debug!("Calling OpenAI {} with model {}", url, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "OpenAI returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse OpenAI response: {}", e))
        })?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| {
                AppError::ExternalApiError("OpenAI response contained no choices".to_string())
            })?;

        let draft: EmailDraft = serde_json::from_str(content).map_err(|e| {
            AppError::ExternalApiError(format!("Model output was not the expected JSON: {}", e))
        })?;

        Ok(GeneratedEmail {
            subject: draft.subject,
            body: draft.body,
            score: clamp_score(draft.score),
            insights: draft.insights,
            source: GenerationSource::Model,
        })
    }
}

fn build_prompt(lead: &LeadFields) -> String {
    format!(
        r#"You are AmperReach, an AI that writes highly personalized B2B sales emails.

Lead Information:
- Name: {} {}
- Title: {}
- Company: {}
- Email: {}

Write a personalized outreach email that:
1. References something specific about their company (you can make reasonable inferences)
2. Connects their likely challenges to our solution
3. Includes a clear but soft call-to-action
4. Sounds human and conversational, not salesy

Format your response as JSON:
{{
  "subject": "compelling subject line",
  "body": "full email text with proper formatting",
  "score": 85,
  "insights": ["insight 1", "insight 2", "insight 3"]
}}"#,
        lead.firstname.as_deref().unwrap_or(""),
        lead.lastname.as_deref().unwrap_or(""),
        lead.title.as_deref().unwrap_or("Unknown"),
        lead.company.as_deref().unwrap_or("Unknown"),
        lead.email.as_deref().unwrap_or("Unknown"),
    )
}

/// Coerce the model's score into [0, 100], defaulting when absent or odd.
fn clamp_score(score: Option<Value>) -> f64 {
    let raw = score.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    raw.unwrap_or(75.0).clamp(0.0, 100.0)
}

/// Deterministic template used when the model is unavailable or returns an
/// unusable shape.
fn fallback_email(lead: &LeadFields) -> GeneratedEmail {
    let first = lead.firstname.as_deref().unwrap_or("there");
    let company = lead.company.as_deref().unwrap_or("your company");

    GeneratedEmail {
        subject: format!("{}, quick question about {}'s growth", first, company),
        body: format!(
            "Hi {},\n\nI noticed {} is in the technology space. Many companies like \
             yours are looking to accelerate their sales outreach...\n\nWould you be \
             open to a brief call next week?\n\nBest,\nYour Sales Team",
            first, company
        ),
        score: 75.0,
        insights: vec![
            "Company name referenced".to_string(),
            "Industry mentioned".to_string(),
            "Clear CTA".to_string(),
        ],
        source: GenerationSource::Fallback,
    }
}
