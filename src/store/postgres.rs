use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use serde_json::Value;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{
    Direction, Lead, LeadStatus, Message, MessageIndexEntry, NewLead, NewMessage,
};
use crate::schema::{leads, message_index, messages};

use super::{LeadStore, OutreachUpdate, StoreError, StoreResult, UnreadUpdate};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Diesel-backed production store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<PgPooledConnection> {
        self.pool.get().map_err(|err| StoreError::Pool(err.to_string()))
    }
}

#[derive(Debug, Queryable)]
struct LeadRow {
    property_id: String,
    display_id: String,
    title: String,
    date_added: DateTime<Utc>,
    lister_name: String,
    lister_phone: Option<String>,
    lister_phone_normalized: Option<String>,
    status: String,
    outreach_history: Value,
    crm_raw: Value,
    last_message_excerpt: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    unread_count: i32,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        // Rows written before history entries had a fixed shape still load;
        // anything unreadable collapses to an empty history.
        let outreach_history = serde_json::from_value(row.outreach_history).unwrap_or_default();
        Lead {
            property_id: row.property_id,
            display_id: row.display_id,
            title: row.title,
            date_added: row.date_added,
            lister_name: row.lister_name,
            lister_phone: row.lister_phone,
            lister_phone_normalized: row.lister_phone_normalized,
            status: LeadStatus::parse_lossy(&row.status),
            outreach_history,
            crm_raw: row.crm_raw,
            last_message_excerpt: row.last_message_excerpt,
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = leads)]
struct NewLeadRow {
    property_id: String,
    display_id: String,
    title: String,
    date_added: DateTime<Utc>,
    lister_name: String,
    lister_phone: Option<String>,
    lister_phone_normalized: Option<String>,
    status: String,
    outreach_history: Value,
    crm_raw: Value,
    unread_count: i32,
}

#[derive(Debug, Queryable)]
struct MessageRow {
    id: Uuid,
    property_id: String,
    direction: String,
    body: String,
    message_type: String,
    sent_at: DateTime<Utc>,
    status: Option<String>,
    status_updated_at: Option<DateTime<Utc>>,
    message_id: Option<String>,
    raw: Option<Value>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            property_id: row.property_id,
            direction: Direction::parse_lossy(&row.direction),
            body: row.body,
            message_type: row.message_type,
            sent_at: row.sent_at,
            status: row.status,
            status_updated_at: row.status_updated_at,
            message_id: row.message_id,
            raw: row.raw,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow {
    id: Uuid,
    property_id: String,
    direction: String,
    body: String,
    message_type: String,
    sent_at: DateTime<Utc>,
    status: Option<String>,
    message_id: Option<String>,
    raw: Option<Value>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = message_index)]
struct IndexRow {
    message_id: String,
    property_id: String,
    message_doc_id: Uuid,
    direction: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl LeadStore for PgStore {
    async fn get_lead(&self, property_id: &str) -> StoreResult<Option<Lead>> {
        let mut conn = self.conn()?;
        let row = leads::table
            .find(property_id)
            .first::<LeadRow>(&mut conn)
            .optional()?;
        Ok(row.map(Lead::from))
    }

    async fn lead_exists(&self, property_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let found = leads::table
            .find(property_id)
            .select(leads::property_id)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert_lead(&self, lead: NewLead) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let row = NewLeadRow {
            property_id: lead.property_id,
            display_id: lead.display_id,
            title: lead.title,
            date_added: lead.date_added,
            lister_name: lead.lister_name,
            lister_phone: lead.lister_phone,
            lister_phone_normalized: lead.lister_phone_normalized,
            status: LeadStatus::Lead.as_str().to_string(),
            outreach_history: Value::Array(Vec::new()),
            crm_raw: lead.crm_raw,
            unread_count: 0,
        };
        diesel::insert_into(leads::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn leads_by_status(&self, status: LeadStatus) -> StoreResult<Vec<Lead>> {
        let mut conn = self.conn()?;
        let rows = leads::table
            .filter(leads::status.eq(status.as_str()))
            .order(leads::date_added.desc())
            .load::<LeadRow>(&mut conn)?;
        Ok(rows.into_iter().map(Lead::from).collect())
    }

    async fn find_by_normalized_phone(&self, normalized: &str) -> StoreResult<Option<Lead>> {
        let mut conn = self.conn()?;
        let row = leads::table
            .filter(leads::lister_phone_normalized.eq(normalized))
            .limit(1)
            .first::<LeadRow>(&mut conn)
            .optional()?;
        Ok(row.map(Lead::from))
    }

    async fn all_leads(&self) -> StoreResult<Vec<Lead>> {
        let mut conn = self.conn()?;
        let rows = leads::table.load::<LeadRow>(&mut conn)?;
        Ok(rows.into_iter().map(Lead::from).collect())
    }

    async fn set_normalized_phone(&self, property_id: &str, normalized: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::update(leads::table.find(property_id))
            .set(leads::lister_phone_normalized.eq(normalized))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn update_outreach(&self, property_id: &str, update: OutreachUpdate) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let history = serde_json::to_value(&update.outreach_history)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        match update.lister_phone_normalized {
            Some(normalized) => {
                diesel::update(leads::table.find(property_id))
                    .set((
                        leads::status.eq(update.status.as_str()),
                        leads::outreach_history.eq(history),
                        leads::lister_phone_normalized.eq(normalized),
                    ))
                    .execute(&mut conn)?;
            }
            None => {
                diesel::update(leads::table.find(property_id))
                    .set((
                        leads::status.eq(update.status.as_str()),
                        leads::outreach_history.eq(history),
                    ))
                    .execute(&mut conn)?;
            }
        }
        Ok(())
    }

    async fn append_message(&self, property_id: &str, message: NewMessage) -> StoreResult<Uuid> {
        let mut conn = self.conn()?;
        let row = NewMessageRow {
            id: Uuid::new_v4(),
            property_id: property_id.to_string(),
            direction: message.direction.as_str().to_string(),
            body: message.body,
            message_type: message.message_type,
            sent_at: message.sent_at,
            status: message.status,
            message_id: message.message_id,
            raw: message.raw,
        };
        diesel::insert_into(messages::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(row.id)
    }

    async fn touch_summary(
        &self,
        property_id: &str,
        excerpt: &str,
        at: DateTime<Utc>,
        unread: UnreadUpdate,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let target = leads::table.find(property_id);
        match unread {
            UnreadUpdate::Increment => {
                diesel::update(target)
                    .set((
                        leads::last_message_excerpt.eq(excerpt),
                        leads::last_message_at.eq(at),
                        leads::unread_count.eq(leads::unread_count + 1),
                    ))
                    .execute(&mut conn)?;
            }
            UnreadUpdate::Reset => {
                diesel::update(target)
                    .set((
                        leads::last_message_excerpt.eq(excerpt),
                        leads::last_message_at.eq(at),
                        leads::unread_count.eq(0),
                    ))
                    .execute(&mut conn)?;
            }
            UnreadUpdate::Keep => {
                diesel::update(target)
                    .set((
                        leads::last_message_excerpt.eq(excerpt),
                        leads::last_message_at.eq(at),
                    ))
                    .execute(&mut conn)?;
            }
        }
        Ok(())
    }

    async fn set_unread_count(&self, property_id: &str, value: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::update(leads::table.find(property_id))
            .set(leads::unread_count.eq(value))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn messages_for_lead(&self, property_id: &str) -> StoreResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let rows = messages::table
            .filter(messages::property_id.eq(property_id))
            .order(messages::sent_at.asc())
            .load::<MessageRow>(&mut conn)?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn set_message_status(
        &self,
        property_id: &str,
        message_doc_id: Uuid,
        status: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::update(
            messages::table
                .filter(messages::id.eq(message_doc_id))
                .filter(messages::property_id.eq(property_id)),
        )
        .set((
            messages::status.eq(status),
            messages::status_updated_at.eq(at),
        ))
        .execute(&mut conn)?;
        Ok(())
    }

    async fn put_index_entry(&self, message_id: &str, entry: MessageIndexEntry) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let row = IndexRow {
            message_id: message_id.to_string(),
            property_id: entry.property_id,
            message_doc_id: entry.message_doc_id,
            direction: entry.direction.as_str().to_string(),
            created_at: entry.created_at,
        };
        diesel::insert_into(message_index::table)
            .values(&row)
            .on_conflict(message_index::message_id)
            .do_update()
            .set((
                message_index::property_id.eq(&row.property_id),
                message_index::message_doc_id.eq(row.message_doc_id),
                message_index::direction.eq(&row.direction),
                message_index::created_at.eq(row.created_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn get_index_entry(&self, message_id: &str) -> StoreResult<Option<MessageIndexEntry>> {
        let mut conn = self.conn()?;
        let row = message_index::table
            .find(message_id)
            .first::<IndexRow>(&mut conn)
            .optional()?;
        Ok(row.map(|row| MessageIndexEntry {
            property_id: row.property_id,
            message_doc_id: row.message_doc_id,
            direction: Direction::parse_lossy(&row.direction),
            created_at: row.created_at,
        }))
    }
}
