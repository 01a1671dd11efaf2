//! Incremental ingestion of the CRM listings feed.
//!
//! The feed arrives ordered by descending `date_added`, so the first record
//! that is already stored (or older than the configured cutoff) marks the
//! boundary: everything after it in this page and every later page was
//! ingested by a prior run, and the walk stops. That makes re-running the
//! poller against an unchanged feed a single page fetch with zero writes.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::crm::{self, CrmApi};
use crate::models::NewLead;
use crate::phone;
use crate::store::LeadStore;

#[derive(Debug, Clone, Default)]
pub struct PollSummary {
    pub pages_fetched: u32,
    pub leads_created: u32,
    pub records_skipped: u32,
    pub boundary_hit: bool,
    /// A transport or decode failure ended the walk before a boundary was
    /// found. Non-fatal: the next scheduled run retries from the same spot.
    pub aborted: bool,
}

impl PollSummary {
    pub fn describe(&self) -> String {
        format!(
            "pages={} created={} skipped={} boundary={} aborted={}",
            self.pages_fetched, self.leads_created, self.records_skipped, self.boundary_hit,
            self.aborted
        )
    }
}

pub struct Poller {
    store: Arc<dyn LeadStore>,
    crm: Arc<dyn CrmApi>,
    cutoff: Option<DateTime<Utc>>,
    dial_code: String,
}

impl Poller {
    pub fn new(
        store: Arc<dyn LeadStore>,
        crm: Arc<dyn CrmApi>,
        cutoff: Option<DateTime<Utc>>,
        dial_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            crm,
            cutoff,
            dial_code: dial_code.into(),
        }
    }

    /// Walk the feed page by page until a boundary, the last page, or a
    /// transport failure. Pagination is sequential on purpose: each page's
    /// boundary decision depends on the previous page having been fully
    /// processed in feed order.
    pub async fn run(&self) -> Result<PollSummary> {
        let mut summary = PollSummary::default();
        let mut next_page: Option<String> = None;

        loop {
            let page = match self.crm.fetch_page(next_page.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    error!(error = %err, "failed to fetch listings page; ending poll run");
                    summary.aborted = true;
                    break;
                }
            };
            summary.pages_fetched += 1;

            if self.process_page(&page.results, &mut summary).await? {
                summary.boundary_hit = true;
                break;
            }

            match page.next {
                Some(url) => next_page = Some(url),
                None => {
                    info!("no additional pages to process");
                    break;
                }
            }
        }

        info!(summary = %summary.describe(), "poll run complete");
        Ok(summary)
    }

    /// Returns true when a boundary (known record or cutoff) was hit.
    async fn process_page(&self, records: &[Value], summary: &mut PollSummary) -> Result<bool> {
        for record in records {
            let Some(property_id) = crm::listing_id(record) else {
                warn!("skipping listing without an id");
                summary.records_skipped += 1;
                continue;
            };

            if self.store.lead_exists(&property_id).await? {
                info!(property_id = %property_id, "encountered existing lead; stopping pagination");
                return Ok(true);
            }

            let date_added = parse_date_added(crm::listing_date_added(record), &property_id);
            if let Some(cutoff) = self.cutoff {
                if date_added < cutoff {
                    info!(
                        property_id = %property_id,
                        date_added = %date_added,
                        cutoff = %cutoff,
                        "listing predates cutoff; stopping pagination"
                    );
                    return Ok(true);
                }
            }

            info!(property_id = %property_id, "discovered new listing; fetching contact");
            let contact = match self.crm.fetch_contact(&property_id).await {
                Ok(Some(contact)) => contact,
                Ok(None) => {
                    warn!(property_id = %property_id, "no contacts returned; skipping lead creation");
                    summary.records_skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(property_id = %property_id, error = %err, "contact fetch failed; skipping lead creation");
                    summary.records_skipped += 1;
                    continue;
                }
            };

            let lister_phone = contact.primary_phone();
            let lister_phone_normalized = lister_phone
                .as_deref()
                .map(|number| phone::normalize_with_country(number, &self.dial_code))
                .filter(|normalized| !normalized.is_empty());

            let new_lead = NewLead {
                display_id: crm::listing_display_id(record).unwrap_or_else(|| property_id.clone()),
                title: crm::listing_title(record)
                    .unwrap_or_else(|| "Untitled property".to_string()),
                date_added,
                lister_name: contact.lister_name(),
                lister_phone,
                lister_phone_normalized,
                crm_raw: record.clone(),
                property_id: property_id.clone(),
            };

            match self.store.insert_lead(new_lead).await {
                Ok(()) => {
                    info!(property_id = %property_id, "persisted new lead");
                    summary.leads_created += 1;
                }
                Err(err) => {
                    error!(property_id = %property_id, error = %err, "failed to persist lead");
                    summary.records_skipped += 1;
                }
            }
        }

        Ok(false)
    }
}

/// ISO-8601 with `Z` or offset, or a naive timestamp treated as UTC. A
/// missing or malformed value falls back to "now" rather than aborting
/// the walk.
fn parse_date_added(raw: Option<&str>, property_id: &str) -> DateTime<Utc> {
    let Some(raw) = raw else {
        warn!(property_id = %property_id, "missing date_added; defaulting to current time");
        return Utc::now();
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }

    warn!(property_id = %property_id, value = %raw, "unparsable date_added; defaulting to current time");
    Utc::now()
}
