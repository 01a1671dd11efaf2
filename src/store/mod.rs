use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Lead, LeadStatus, Message, MessageIndexEntry, NewLead, NewMessage, OutreachEntry,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How a message recording touches the lead's unread counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadUpdate {
    /// Inbound message: must use the store's atomic increment, not a
    /// read-modify-write, so concurrent deliveries both count.
    Increment,
    Reset,
    Keep,
}

/// Fields patched together when an outreach attempt concludes.
#[derive(Debug, Clone)]
pub struct OutreachUpdate {
    pub status: LeadStatus,
    pub outreach_history: Vec<OutreachEntry>,
    pub lister_phone_normalized: Option<String>,
}

/// The document store the core coordinates through. Keyed lookups, a
/// couple of equality-filtered queries, an atomic counter and per-document
/// patches; no cross-document transactions are assumed.
#[async_trait]
pub trait LeadStore: Send + Sync + 'static {
    async fn get_lead(&self, property_id: &str) -> StoreResult<Option<Lead>>;

    async fn lead_exists(&self, property_id: &str) -> StoreResult<bool>;

    async fn insert_lead(&self, lead: NewLead) -> StoreResult<()>;

    /// Leads in a given status, newest `date_added` first.
    async fn leads_by_status(&self, status: LeadStatus) -> StoreResult<Vec<Lead>>;

    /// First lead whose stored normalized phone equals `normalized` (limit 1).
    async fn find_by_normalized_phone(&self, normalized: &str) -> StoreResult<Option<Lead>>;

    /// Every lead, for the resolver's last-resort scan. O(total leads).
    async fn all_leads(&self) -> StoreResult<Vec<Lead>>;

    async fn set_normalized_phone(&self, property_id: &str, normalized: &str) -> StoreResult<()>;

    async fn update_outreach(&self, property_id: &str, update: OutreachUpdate) -> StoreResult<()>;

    /// Append a message under the lead and return its generated id.
    async fn append_message(&self, property_id: &str, message: NewMessage) -> StoreResult<Uuid>;

    /// Patch the lead's denormalized summary fields. A missing lead is a
    /// silent no-op: callers check that precondition.
    async fn touch_summary(
        &self,
        property_id: &str,
        excerpt: &str,
        at: DateTime<Utc>,
        unread: UnreadUpdate,
    ) -> StoreResult<()>;

    async fn set_unread_count(&self, property_id: &str, value: i32) -> StoreResult<()>;

    /// Messages for a lead, ascending by send time.
    async fn messages_for_lead(&self, property_id: &str) -> StoreResult<Vec<Message>>;

    async fn set_message_status(
        &self,
        property_id: &str,
        message_doc_id: Uuid,
        status: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Entries are never pruned; growth is bounded only by message volume
    /// (a capacity-planning item, not a correctness one).
    async fn put_index_entry(&self, message_id: &str, entry: MessageIndexEntry) -> StoreResult<()>;

    async fn get_index_entry(&self, message_id: &str) -> StoreResult<Option<MessageIndexEntry>>;
}
