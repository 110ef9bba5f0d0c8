use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A sales prospect record, keyed by its CRM id.
///
/// Every webhook event referencing the id replaces the record wholesale
/// (last-write-wins per event, not per field). The AI email annotation is the
/// only part updated independently, after a successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    /// Owner/assignment reference. Absence means "unassigned".
    pub ownerid: Option<String>,
    pub industry: Option<String>,
    pub leadsource: Option<String>,
    pub status: Option<String>,
    pub createddate: Option<String>,
    pub lastmodifieddate: Option<String>,
    /// Generated outreach email, if any. A lead with one is "complete" and
    /// must not be regenerated.
    pub ai_email: Option<AiEmail>,
    /// Any additional CRM fields the event carried.
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Value>,
}

/// Generated outreach email attached to a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiEmail {
    pub subject: String,
    pub body: String,
    /// Quality score in [0, 100].
    pub score: f64,
    pub personalizations: Vec<String>,
}

/// A CRM account record. Stored independently of leads; leads reference
/// accounts only informally by company name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    /// Any additional fields the CRM sent along.
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Value>,
}

/// Category tag for an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    WebhookReceived,
    AiGenerating,
    Success,
    Error,
}

/// Human-readable event record for the dashboard activity feed.
///
/// Diagnostic trail only, not a system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "leadId")]
    pub lead_id: Option<String>,
}

impl Activity {
    pub fn new(kind: ActivityKind, message: impl Into<String>, lead_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            lead_id,
        }
    }
}

/// Flat lead projection served to the dashboard by `GET /api/state`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadView {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub industry: String,
    pub lead_source: String,
    pub assigned_to: String,
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub ai_email: Option<AiEmail>,
    pub response_status: Option<String>,
    pub response_rate: Option<f64>,
}

impl From<&Lead> for LeadView {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id.clone(),
            first_name: lead.firstname.clone(),
            last_name: lead.lastname.clone(),
            email: lead.email.clone(),
            title: lead.title.clone(),
            company: lead.company.clone(),
            industry: lead
                .industry
                .clone()
                .unwrap_or_else(|| "Technology".to_string()),
            lead_source: lead
                .leadsource
                .clone()
                .unwrap_or_else(|| "Website".to_string()),
            assigned_to: lead
                .ownerid
                .clone()
                .unwrap_or_else(|| "Unassigned".to_string()),
            status: lead.status.clone().unwrap_or_else(|| "New".to_string()),
            created_at: lead.createddate.clone(),
            updated_at: lead.lastmodifieddate.clone(),
            ai_email: lead.ai_email.clone(),
            response_status: None,
            response_rate: None,
        }
    }
}

/// Response body for `GET /api/state`.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub leads: Vec<LeadView>,
    pub activities: Vec<Activity>,
}
