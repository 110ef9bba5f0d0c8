use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{Account, AiEmail, Lead};

/// Result of validating an inbound webhook envelope.
///
/// The integration platform multiplexes unrelated object types to every
/// listener, so a wrong `objectName` is a normal no-op, not an error.
pub enum EnvelopeCheck<'a> {
    /// Envelope absent, malformed, or `result` is not an array.
    Malformed(&'static str),
    /// `objectName` does not match what this endpoint handles.
    WrongObject(Option<&'a str>),
    /// Valid envelope with the raw event items.
    Ok(&'a [Value]),
}

/// Validate the envelope shape and object type of a webhook payload.
pub fn check_envelope<'a>(payload: &'a Value, expected_object: &str) -> EnvelopeCheck<'a> {
    let Some(result) = payload.get("result").and_then(Value::as_array) else {
        return EnvelopeCheck::Malformed("Invalid payload - missing result array");
    };

    let object_name = payload.get("objectName").and_then(Value::as_str);
    if object_name != Some(expected_object) {
        return EnvelopeCheck::WrongObject(object_name);
    }

    EnvelopeCheck::Ok(result)
}

/// Envelope-level metadata used to address the CRM write-back.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeMeta {
    pub project_id: Option<String>,
    pub group_ref: Option<String>,
    pub installation_id: Option<String>,
    pub action: Option<String>,
    pub provider: Option<String>,
}

impl EnvelopeMeta {
    pub fn from_payload(payload: &Value) -> Self {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            project_id: field("projectId"),
            group_ref: field("groupRef"),
            installation_id: field("installationId"),
            action: field("action"),
            provider: field("provider"),
        }
    }
}

/// A single event item inside a webhook batch.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadWebhookItem {
    /// Authoritative record for the referenced lead.
    #[serde(default)]
    pub fields: Option<LeadFields>,
    /// Flattened view of custom fields already written to the CRM; a populated
    /// outreach subject here is the read-back signal of prior processing.
    #[serde(default, rename = "mappedFields")]
    pub mapped_fields: MappedOutreachFields,
    /// Event type for real-time deliveries ("create", "update", ...). Present
    /// only on the real-time path and not required for correctness.
    #[serde(default, rename = "subscribeEventType")]
    pub subscribe_event_type: Option<String>,
}

/// Lead fields as delivered by the CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadFields {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ownerid: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub leadsource: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub createddate: Option<String>,
    #[serde(default)]
    pub lastmodifieddate: Option<String>,
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Value>,
}

impl LeadFields {
    /// Whether the lead has been assigned to an owner. An empty owner id
    /// counts as unassigned.
    pub fn is_assigned(&self) -> bool {
        self.ownerid
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// "First Last" for log and activity messages.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.firstname.as_deref().unwrap_or("Unknown"),
            self.lastname.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }

    /// Convert into a store record. Returns `None` when the item carries no id.
    pub fn into_lead(self, ai_email: Option<AiEmail>) -> Option<Lead> {
        Some(Lead {
            id: self.id?,
            firstname: self.firstname,
            lastname: self.lastname,
            title: self.title,
            company: self.company,
            email: self.email,
            ownerid: self.ownerid,
            industry: self.industry,
            leadsource: self.leadsource,
            status: self.status,
            createddate: self.createddate,
            lastmodifieddate: self.lastmodifieddate,
            ai_email,
            raw: self.raw,
        })
    }
}

/// Custom outreach fields read back from the CRM.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappedOutreachFields {
    #[serde(default)]
    pub outreach_subject: Option<String>,
    #[serde(default)]
    pub outreach_body: Option<String>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub outreach_score: Option<f64>,
    #[serde(default)]
    pub outreach_personalization_notes: Option<String>,
}

impl MappedOutreachFields {
    /// The idempotency guard: a populated outreach subject means an email was
    /// already generated and written back for this lead.
    pub fn has_outreach_subject(&self) -> bool {
        self.outreach_subject
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// Fold the mapped fields into a stored email annotation, if present.
    pub fn to_ai_email(&self) -> Option<AiEmail> {
        if !self.has_outreach_subject() {
            return None;
        }
        Some(AiEmail {
            subject: self.outreach_subject.clone().unwrap_or_default(),
            body: self.outreach_body.clone().unwrap_or_default(),
            score: self.outreach_score.unwrap_or(0.0),
            personalizations: self
                .outreach_personalization_notes
                .as_deref()
                .map(|notes| notes.lines().map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

/// Accept the outreach score as a number or a numeric string; anything else
/// coerces to `None` rather than failing the whole item.
fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// A single event item inside an account webhook batch.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountWebhookItem {
    #[serde(default)]
    pub fields: Option<AccountFields>,
}

/// Account fields as delivered by the CRM.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountFields {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Value>,
}

impl AccountFields {
    pub fn into_account(self) -> Option<Account> {
        Some(Account {
            id: self.id?,
            name: self.name,
            industry: self.industry,
            website: self.website,
            raw: self.raw,
        })
    }
}

/// Response for the batch backfill webhooks.
#[derive(Debug, Serialize)]
pub struct BatchWebhookResponse {
    pub success: bool,
    pub processed: usize,
}

/// Response for the real-time lead webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeWebhookResponse {
    pub success: bool,
    pub request_id: String,
    pub processed: usize,
    pub emails_generated: usize,
    /// Total handling time in milliseconds.
    pub duration: u128,
}
