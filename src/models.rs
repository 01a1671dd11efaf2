use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// State machine for a lead. The only transitions driven by code are
/// LEAD -> REACHED_OUT (successful outreach) and LEAD -> ERROR (failed
/// outreach). ERROR is not re-driven automatically; recovering such a
/// lead is an operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "LEAD")]
    Lead,
    #[serde(rename = "REACHED_OUT")]
    ReachedOut,
    #[serde(rename = "ERROR")]
    Error,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Lead => "LEAD",
            LeadStatus::ReachedOut => "REACHED_OUT",
            LeadStatus::Error => "ERROR",
        }
    }

    /// Unknown stored values fall back to LEAD rather than failing the read.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw {
            "REACHED_OUT" => LeadStatus::ReachedOut,
            "ERROR" => LeadStatus::Error,
            _ => LeadStatus::Lead,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn parse_lossy(raw: &str) -> Self {
        match raw {
            "inbound" => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }
}

/// One outreach attempt, appended to the lead's history and never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachEntry {
    pub date: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One upstream listing, keyed by its stable CRM identifier. Existence of
/// a lead for a given `property_id` is the sole deduplication signal the
/// ingestion walker relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub property_id: String,
    pub display_id: String,
    pub title: String,
    pub date_added: DateTime<Utc>,
    pub lister_name: String,
    pub lister_phone: Option<String>,
    pub lister_phone_normalized: Option<String>,
    pub status: LeadStatus,
    pub outreach_history: Vec<OutreachEntry>,
    pub crm_raw: Value,
    pub last_message_excerpt: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub property_id: String,
    pub display_id: String,
    pub title: String,
    pub date_added: DateTime<Utc>,
    pub lister_name: String,
    pub lister_phone: Option<String>,
    pub lister_phone_normalized: Option<String>,
    pub crm_raw: Value,
}

impl NewLead {
    pub fn into_lead(self) -> Lead {
        Lead {
            property_id: self.property_id,
            display_id: self.display_id,
            title: self.title,
            date_added: self.date_added,
            lister_name: self.lister_name,
            lister_phone: self.lister_phone,
            lister_phone_normalized: self.lister_phone_normalized,
            status: LeadStatus::Lead,
            outreach_history: Vec::new(),
            crm_raw: self.crm_raw,
            last_message_excerpt: None,
            last_message_at: None,
            unread_count: 0,
        }
    }
}

/// One inbound or outbound messaging event under a lead. Created once;
/// only `status`/`status_updated_at` may be patched afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub property_id: String,
    pub direction: Direction,
    pub body: String,
    pub message_type: String,
    pub sent_at: DateTime<Utc>,
    pub status: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub raw: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub direction: Direction,
    pub body: String,
    pub message_type: String,
    pub sent_at: DateTime<Utc>,
    pub status: Option<String>,
    pub message_id: Option<String>,
    pub raw: Option<Value>,
}

/// Reverse lookup from a remote message identifier to the stored message,
/// written alongside the message and read-only afterwards. Used to route
/// delivery-status updates without scanning every lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageIndexEntry {
    pub property_id: String,
    pub message_doc_id: Uuid,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}
