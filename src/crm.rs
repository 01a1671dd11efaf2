//! Client for the upstream CRM listings feed. Listing records are kept as
//! opaque JSON (the whole payload is persisted verbatim on the lead for
//! audit), with typed accessors for the handful of fields ingestion needs.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

const CRM_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "crm-leads-poller/2.0";

/// One page of the listings feed, ordered by descending recency, plus an
/// opaque pointer to the next page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingsPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phones: Vec<ContactPhone>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPhone {
    #[serde(default)]
    pub phone: Option<String>,
}

impl Contact {
    /// Joined first/last name, or "N/A" when the contact carries neither.
    pub fn lister_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            "N/A".to_string()
        } else {
            parts.join(" ")
        }
    }

    pub fn primary_phone(&self) -> Option<String> {
        self.phones
            .iter()
            .filter_map(|entry| entry.phone.as_deref())
            .find(|number| !number.is_empty())
            .map(str::to_string)
    }
}

/// The listing identifier arrives as a JSON number or string depending on
/// the upstream serializer; either way it becomes the lead key.
pub fn listing_id(record: &Value) -> Option<String> {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub fn listing_display_id(record: &Value) -> Option<String> {
    match record.get("display_id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub fn listing_title(record: &Value) -> Option<String> {
    record
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
}

pub fn listing_date_added(record: &Value) -> Option<&str> {
    record.get("date_added").and_then(Value::as_str)
}

#[async_trait]
pub trait CrmApi: Send + Sync + 'static {
    /// Fetch a feed page; `None` means the first page of the
    /// descending-recency ordering.
    async fn fetch_page(&self, page_url: Option<&str>) -> Result<ListingsPage>;

    /// Zero or one contact record for a listing.
    async fn fetch_contact(&self, property_id: &str) -> Result<Option<Contact>>;
}

pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CrmClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CRM_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build CRM HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn first_page_url(&self) -> String {
        format!("{}/api/properties/?ordering=-date_added", self.base_url)
    }
}

#[async_trait]
impl CrmApi for CrmClient {
    async fn fetch_page(&self, page_url: Option<&str>) -> Result<ListingsPage> {
        let url = page_url
            .map(str::to_string)
            .unwrap_or_else(|| self.first_page_url());
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("failed to fetch listings page {url}"))?
            .error_for_status()
            .with_context(|| format!("listings request {url} was rejected"))?;

        response
            .json::<ListingsPage>()
            .await
            .with_context(|| format!("listings response from {url} was not valid JSON"))
    }

    async fn fetch_contact(&self, property_id: &str) -> Result<Option<Contact>> {
        let url = format!("{}/api/properties/{property_id}/contacts/", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("failed to fetch contacts for property {property_id}"))?
            .error_for_status()
            .with_context(|| format!("contacts request for property {property_id} was rejected"))?;

        let mut contacts = response
            .json::<Vec<Contact>>()
            .await
            .with_context(|| format!("contacts response for property {property_id} was not valid JSON"))?;

        if contacts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(contacts.swap_remove(0)))
        }
    }
}
