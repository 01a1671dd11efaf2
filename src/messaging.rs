//! Correlation between messaging events and lead records: resolving an
//! inbound sender to a lead, recording message events, and routing
//! delivery-status updates back to the stored message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{Direction, Lead, MessageIndexEntry, NewMessage};
use crate::phone;
use crate::store::{LeadStore, StoreResult, UnreadUpdate};
use uuid::Uuid;

pub const EXCERPT_MAX_CHARS: usize = 200;

/// Lead summary preview, truncated on a character boundary.
pub fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_MAX_CHARS).collect()
}

/// Maps a raw inbound sender identifier to a lead despite historical
/// inconsistency in how phone numbers were stored. Tiered: exact match on
/// the canonical form, then a local-format candidate, then a full scan
/// that re-normalizes each lead's raw phone. The two fallback tiers
/// self-heal the stored normalized field on a hit, so each stale record
/// pays the scan cost at most once.
pub struct LeadResolver {
    store: Arc<dyn LeadStore>,
    dial_code: String,
}

impl LeadResolver {
    pub fn new(store: Arc<dyn LeadStore>, dial_code: impl Into<String>) -> Self {
        Self {
            store,
            dial_code: dial_code.into(),
        }
    }

    pub async fn resolve(&self, raw_sender: &str) -> StoreResult<Option<Lead>> {
        let canonical = phone::normalize_with_country(raw_sender, &self.dial_code);
        if canonical.is_empty() {
            return Ok(None);
        }

        if let Some(lead) = self.store.find_by_normalized_phone(&canonical).await? {
            return Ok(Some(lead));
        }

        // Older leads were stored in local format: the canonical digits
        // with the dial code stripped and the trunk `0` restored.
        let raw_digits = phone::digits(raw_sender);
        let local_candidate = raw_digits
            .strip_prefix(self.dial_code.as_str())
            .filter(|_| !self.dial_code.is_empty())
            .map(|rest| format!("0{rest}"))
            .unwrap_or(raw_digits);

        if !local_candidate.is_empty() && local_candidate != canonical {
            if let Some(mut lead) = self.store.find_by_normalized_phone(&local_candidate).await? {
                self.store
                    .set_normalized_phone(&lead.property_id, &canonical)
                    .await?;
                lead.lister_phone_normalized = Some(canonical);
                return Ok(Some(lead));
            }
        }

        // Last resort: O(n) over all leads, re-normalizing each stored raw
        // phone. Leads whose normalized field already equals the target
        // were covered by the first tier and are skipped.
        for mut lead in self.store.all_leads().await? {
            let Some(raw_phone) = lead.lister_phone.clone() else {
                continue;
            };
            if lead.lister_phone_normalized.as_deref() == Some(canonical.as_str()) {
                continue;
            }
            if phone::normalize_with_country(&raw_phone, &self.dial_code) == canonical {
                self.store
                    .set_normalized_phone(&lead.property_id, &canonical)
                    .await?;
                lead.lister_phone_normalized = Some(canonical);
                return Ok(Some(lead));
            }
        }

        Ok(None)
    }
}

/// Appends a message event under a lead, refreshes the lead's summary
/// fields, and registers the reverse-lookup entry for later status
/// updates. Callers verify the lead exists; a stale id degrades to a
/// no-op on the summary patch.
pub struct MessageRecorder {
    store: Arc<dyn LeadStore>,
}

impl MessageRecorder {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        property_id: &str,
        message: NewMessage,
        reset_unread: bool,
    ) -> StoreResult<Uuid> {
        let sent_at = message.sent_at;
        let direction = message.direction;
        let remote_id = message.message_id.clone();
        let preview = excerpt(&message.body);

        let message_doc_id = self.store.append_message(property_id, message).await?;

        let unread = match direction {
            Direction::Inbound => UnreadUpdate::Increment,
            Direction::Outbound if reset_unread => UnreadUpdate::Reset,
            Direction::Outbound => UnreadUpdate::Keep,
        };
        self.store
            .touch_summary(property_id, &preview, sent_at, unread)
            .await?;

        if let Some(remote_id) = remote_id.filter(|id| !id.is_empty()) {
            self.store
                .put_index_entry(
                    &remote_id,
                    MessageIndexEntry {
                        property_id: property_id.to_string(),
                        message_doc_id,
                        direction,
                        created_at: sent_at,
                    },
                )
                .await?;
        }

        Ok(message_doc_id)
    }
}

/// Applies delivery-status updates to previously recorded messages via the
/// message index. Best-effort telemetry: unknown identifiers are dropped
/// and patch failures are logged, never escalated.
pub struct StatusCorrelator {
    store: Arc<dyn LeadStore>,
}

impl StatusCorrelator {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    pub async fn apply(
        &self,
        message_id: Option<&str>,
        status: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let (Some(message_id), Some(status)) = (
            message_id.filter(|id| !id.is_empty()),
            status.filter(|s| !s.is_empty()),
        ) else {
            return Ok(());
        };

        let Some(entry) = self.store.get_index_entry(message_id).await? else {
            debug!(message_id = %message_id, "no message index entry for status update");
            return Ok(());
        };

        if let Err(err) = self
            .store
            .set_message_status(&entry.property_id, entry.message_doc_id, status, at)
            .await
        {
            warn!(
                message_id = %message_id,
                message_doc_id = %entry.message_doc_id,
                error = %err,
                "failed to update message status"
            );
        }
        Ok(())
    }
}
