use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Lead, LeadStatus, Message, MessageIndexEntry, NewLead, NewMessage,
};

use super::{LeadStore, OutreachUpdate, StoreResult, UnreadUpdate};

/// In-memory store used by the test harness and component unit tests.
/// A single mutex over the whole state makes every operation atomic,
/// which is exactly the guarantee the unread counter needs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    leads: HashMap<String, Lead>,
    messages: HashMap<String, Vec<Message>>,
    index: HashMap<String, MessageIndexEntry>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total mutating operations so far; lets tests assert "zero writes".
    pub async fn write_count(&self) -> u64 {
        self.inner.lock().await.writes
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn get_lead(&self, property_id: &str) -> StoreResult<Option<Lead>> {
        let inner = self.inner.lock().await;
        Ok(inner.leads.get(property_id).cloned())
    }

    async fn lead_exists(&self, property_id: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.leads.contains_key(property_id))
    }

    async fn insert_lead(&self, lead: NewLead) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        let lead = lead.into_lead();
        inner.leads.insert(lead.property_id.clone(), lead);
        Ok(())
    }

    async fn leads_by_status(&self, status: LeadStatus) -> StoreResult<Vec<Lead>> {
        let inner = self.inner.lock().await;
        let mut matched: Vec<Lead> = inner
            .leads
            .values()
            .filter(|lead| lead.status == status)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        Ok(matched)
    }

    async fn find_by_normalized_phone(&self, normalized: &str) -> StoreResult<Option<Lead>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .leads
            .values()
            .find(|lead| lead.lister_phone_normalized.as_deref() == Some(normalized))
            .cloned())
    }

    async fn all_leads(&self) -> StoreResult<Vec<Lead>> {
        let inner = self.inner.lock().await;
        Ok(inner.leads.values().cloned().collect())
    }

    async fn set_normalized_phone(&self, property_id: &str, normalized: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        if let Some(lead) = inner.leads.get_mut(property_id) {
            lead.lister_phone_normalized = Some(normalized.to_string());
        }
        Ok(())
    }

    async fn update_outreach(&self, property_id: &str, update: OutreachUpdate) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        if let Some(lead) = inner.leads.get_mut(property_id) {
            lead.status = update.status;
            lead.outreach_history = update.outreach_history;
            if let Some(normalized) = update.lister_phone_normalized {
                lead.lister_phone_normalized = Some(normalized);
            }
        }
        Ok(())
    }

    async fn append_message(&self, property_id: &str, message: NewMessage) -> StoreResult<Uuid> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        let id = Uuid::new_v4();
        let stored = Message {
            id,
            property_id: property_id.to_string(),
            direction: message.direction,
            body: message.body,
            message_type: message.message_type,
            sent_at: message.sent_at,
            status: message.status,
            status_updated_at: None,
            message_id: message.message_id,
            raw: message.raw,
        };
        inner
            .messages
            .entry(property_id.to_string())
            .or_default()
            .push(stored);
        Ok(id)
    }

    async fn touch_summary(
        &self,
        property_id: &str,
        excerpt: &str,
        at: DateTime<Utc>,
        unread: UnreadUpdate,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        if let Some(lead) = inner.leads.get_mut(property_id) {
            lead.last_message_excerpt = Some(excerpt.to_string());
            lead.last_message_at = Some(at);
            match unread {
                UnreadUpdate::Increment => lead.unread_count += 1,
                UnreadUpdate::Reset => lead.unread_count = 0,
                UnreadUpdate::Keep => {}
            }
        }
        Ok(())
    }

    async fn set_unread_count(&self, property_id: &str, value: i32) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        if let Some(lead) = inner.leads.get_mut(property_id) {
            lead.unread_count = value;
        }
        Ok(())
    }

    async fn messages_for_lead(&self, property_id: &str) -> StoreResult<Vec<Message>> {
        let inner = self.inner.lock().await;
        let mut list = inner
            .messages
            .get(property_id)
            .cloned()
            .unwrap_or_default();
        list.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(list)
    }

    async fn set_message_status(
        &self,
        property_id: &str,
        message_doc_id: Uuid,
        status: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        if let Some(list) = inner.messages.get_mut(property_id) {
            if let Some(message) = list.iter_mut().find(|m| m.id == message_doc_id) {
                message.status = Some(status.to_string());
                message.status_updated_at = Some(at);
            }
        }
        Ok(())
    }

    async fn put_index_entry(&self, message_id: &str, entry: MessageIndexEntry) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        inner.index.insert(message_id.to_string(), entry);
        Ok(())
    }

    async fn get_index_entry(&self, message_id: &str) -> StoreResult<Option<MessageIndexEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner.index.get(message_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use serde_json::json;

    fn sample_lead(property_id: &str) -> NewLead {
        NewLead {
            property_id: property_id.to_string(),
            display_id: format!("D-{property_id}"),
            title: "Two-bedroom flat".to_string(),
            date_added: Utc::now(),
            lister_name: "Ana Pop".to_string(),
            lister_phone: Some("0712345678".to_string()),
            lister_phone_normalized: Some("40712345678".to_string()),
            crm_raw: json!({"id": property_id}),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_by_key() {
        let store = MemoryStore::new();
        store.insert_lead(sample_lead("101")).await.unwrap();

        assert!(store.lead_exists("101").await.unwrap());
        assert!(!store.lead_exists("102").await.unwrap());
        let lead = store.get_lead("101").await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Lead);
        assert!(lead.outreach_history.is_empty());
    }

    #[tokio::test]
    async fn summary_touch_on_missing_lead_is_a_no_op() {
        let store = MemoryStore::new();
        store
            .touch_summary("nope", "hello", Utc::now(), UnreadUpdate::Increment)
            .await
            .unwrap();
        assert!(store.get_lead("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_come_back_in_send_order() {
        let store = MemoryStore::new();
        store.insert_lead(sample_lead("7")).await.unwrap();
        let base = Utc::now();
        for offset in [30i64, 10, 20] {
            store
                .append_message(
                    "7",
                    NewMessage {
                        direction: Direction::Inbound,
                        body: format!("msg at +{offset}"),
                        message_type: "text".to_string(),
                        sent_at: base + chrono::Duration::seconds(offset),
                        status: None,
                        message_id: None,
                        raw: None,
                    },
                )
                .await
                .unwrap();
        }

        let messages = store.messages_for_lead("7").await.unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["msg at +10", "msg at +20", "msg at +30"]);
    }
}
