use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use crate::models::{Account, Activity, ActivityKind, AiEmail, Lead};

/// Maximum number of activity records retained; older entries are evicted FIFO.
const MAX_ACTIVITIES: usize = 50;

/// In-memory state owner for leads, accounts and the activity feed.
///
/// Created once at process start and injected into handlers through
/// `AppState`. Holds ephemeral state only; nothing survives a restart.
#[derive(Debug, Default)]
pub struct AppStore {
    leads: RwLock<HashMap<String, Lead>>,
    accounts: RwLock<HashMap<String, Account>>,
    activities: RwLock<VecDeque<Activity>>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored lead wholesale. Last write wins per event.
    pub async fn upsert_lead(&self, lead: Lead) {
        self.leads.write().await.insert(lead.id.clone(), lead);
    }

    /// Attach a generated email to an already-stored lead.
    pub async fn attach_email(&self, lead_id: &str, email: AiEmail) {
        if let Some(lead) = self.leads.write().await.get_mut(lead_id) {
            lead.ai_email = Some(email);
        } else {
            tracing::warn!("attach_email: lead {} not in store", lead_id);
        }
    }

    pub async fn get_lead(&self, lead_id: &str) -> Option<Lead> {
        self.leads.read().await.get(lead_id).cloned()
    }

    pub async fn upsert_account(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }

    /// Append an activity to the front of the feed, evicting the oldest
    /// entries beyond the retention cap.
    pub async fn push_activity(
        &self,
        kind: ActivityKind,
        message: impl Into<String>,
        lead_id: Option<String>,
    ) -> Activity {
        let activity = Activity::new(kind, message, lead_id);
        tracing::info!("Activity: {}", activity.message);
        let mut activities = self.activities.write().await;
        activities.push_front(activity.clone());
        activities.truncate(MAX_ACTIVITIES);
        activity
    }

    /// All leads, sorted by created date descending (newest first).
    pub async fn leads_snapshot(&self) -> Vec<Lead> {
        let mut leads: Vec<Lead> = self.leads.read().await.values().cloned().collect();
        leads.sort_by(|a, b| b.createddate.cmp(&a.createddate));
        leads
    }

    /// The `n` most recent activities, newest first.
    pub async fn recent_activities(&self, n: usize) -> Vec<Activity> {
        self.activities
            .read()
            .await
            .iter()
            .take(n)
            .cloned()
            .collect()
    }

    pub async fn lead_count(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn activity_count(&self) -> usize {
        self.activities.read().await.len()
    }
}
