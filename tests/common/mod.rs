use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use backend::auth::jwt::JwtService;
use backend::auth::password::hash_password;
use backend::config::AppConfig;
use backend::crm::{Contact, CrmApi, ListingsPage};
use backend::models::NewLead;
use backend::routes;
use backend::state::AppState;
use backend::store::memory::MemoryStore;
use backend::store::LeadStore;
use backend::whatsapp::{Messenger, SendError, SendReceipt, WhatsAppSettings};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;

pub const TEST_PASSWORD: &str = "s3cret";

/// Scripted CRM feed. Pages are keyed by URL, with the first page under
/// the empty key; fetches are counted so tests can assert how far the
/// walk went.
#[derive(Default)]
pub struct FakeCrm {
    pages: Mutex<HashMap<String, ListingsPage>>,
    contacts: Mutex<HashMap<String, Option<Contact>>>,
    failing_contacts: Mutex<Vec<String>>,
    page_fetches: Mutex<u32>,
    contact_fetches: Mutex<u32>,
}

impl FakeCrm {
    pub async fn script_page(&self, url: Option<&str>, results: Vec<Value>, next: Option<&str>) {
        let key = url.unwrap_or("").to_string();
        self.pages.lock().await.insert(
            key,
            ListingsPage {
                results,
                next: next.map(str::to_string),
            },
        );
    }

    pub async fn script_contact(&self, property_id: &str, contact: Option<Contact>) {
        self.contacts
            .lock()
            .await
            .insert(property_id.to_string(), contact);
    }

    pub async fn fail_contact(&self, property_id: &str) {
        self.failing_contacts
            .lock()
            .await
            .push(property_id.to_string());
    }

    pub async fn page_fetches(&self) -> u32 {
        *self.page_fetches.lock().await
    }

    #[allow(dead_code)]
    pub async fn contact_fetches(&self) -> u32 {
        *self.contact_fetches.lock().await
    }
}

#[async_trait]
impl CrmApi for FakeCrm {
    async fn fetch_page(&self, page_url: Option<&str>) -> Result<ListingsPage> {
        *self.page_fetches.lock().await += 1;
        let key = page_url.unwrap_or("");
        self.pages
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted page for {key:?}"))
    }

    async fn fetch_contact(&self, property_id: &str) -> Result<Option<Contact>> {
        *self.contact_fetches.lock().await += 1;
        if self
            .failing_contacts
            .lock()
            .await
            .iter()
            .any(|id| id == property_id)
        {
            return Err(anyhow!("scripted contact failure for {property_id}"));
        }
        Ok(self
            .contacts
            .lock()
            .await
            .get(property_id)
            .cloned()
            .flatten())
    }
}

#[derive(Clone)]
#[allow(dead_code)]
pub struct RecordedSend {
    pub recipient: String,
    pub kind: String,
    pub template: Option<String>,
    pub body: Option<String>,
}

/// Messaging fake. Succeeds with sequential message ids unless a failure
/// has been scripted.
#[derive(Default)]
pub struct FakeMessenger {
    sends: Mutex<Vec<RecordedSend>>,
    fail_next: Mutex<Option<(u16, String)>>,
    counter: Mutex<u32>,
}

impl FakeMessenger {
    pub async fn fail_next(&self, status: u16, body: &str) {
        *self.fail_next.lock().await = Some((status, body.to_string()));
    }

    pub async fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().await.clone()
    }

    async fn complete(&self, send: RecordedSend, request: Value) -> Result<SendReceipt, SendError> {
        if let Some((status, body)) = self.fail_next.lock().await.take() {
            return Err(SendError::Api { status, body });
        }
        let mut counter = self.counter.lock().await;
        *counter += 1;
        let message_id = format!("wamid.fake-{}", *counter);
        self.sends.lock().await.push(send);
        Ok(SendReceipt {
            message_id: Some(message_id.clone()),
            request,
            response: json!({ "messages": [{ "id": message_id }] }),
        })
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_template(
        &self,
        _settings: &WhatsAppSettings,
        recipient: &str,
        template: &str,
        components: &[Value],
    ) -> Result<SendReceipt, SendError> {
        self.complete(
            RecordedSend {
                recipient: recipient.to_string(),
                kind: "template".to_string(),
                template: Some(template.to_string()),
                body: None,
            },
            json!({ "template": template, "components": components }),
        )
        .await
    }

    async fn send_text(
        &self,
        _settings: &WhatsAppSettings,
        recipient: &str,
        body: &str,
    ) -> Result<SendReceipt, SendError> {
        self.complete(
            RecordedSend {
                recipient: recipient.to_string(),
                kind: "text".to_string(),
                template: None,
                body: Some(body.to_string()),
            },
            json!({ "text": body }),
        )
        .await
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    store: Arc<MemoryStore>,
    crm: Arc<FakeCrm>,
    messenger: Arc<FakeMessenger>,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::new_with(|_| {})
    }

    pub fn new_with(customize: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let mut config = AppConfig {
            database_url: "postgres://unused".to_string(),
            database_max_pool_size: 1,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cookie_secret: "test-cookie-secret".to_string(),
            session_expiry_minutes: 60,
            dashboard_password_hash: Some(hash_password(TEST_PASSWORD)?),
            cors_allowed_origins: None,
            crm_base_url: "https://crm.test".to_string(),
            crm_api_key: Some("test-key".to_string()),
            crm_ignore_before: None,
            default_country_dial_code: "40".to_string(),
            graph_api_base: "https://graph.test".to_string(),
            whatsapp_phone_number_id: Some("12345".to_string()),
            whatsapp_access_token: Some("test-token".to_string()),
            whatsapp_template_name: Some("new_leads".to_string()),
            whatsapp_template_language: "en".to_string(),
            whatsapp_template_parameter_count: 3,
            personal_whatsapp_link: Some("https://wa.me/40700000000".to_string()),
            whatsapp_webhook_verify_token: Some("test-verify".to_string()),
        };
        customize(&mut config);

        let store = Arc::new(MemoryStore::new());
        let crm = Arc::new(FakeCrm::default());
        let messenger = Arc::new(FakeMessenger::default());
        let jwt = JwtService::from_config(&config)?;

        let state = AppState::new(
            store.clone(),
            Some(crm.clone()),
            messenger.clone(),
            config,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            store,
            crm,
            messenger,
        })
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn crm(&self) -> Arc<FakeCrm> {
        self.crm.clone()
    }

    pub fn messenger(&self) -> Arc<FakeMessenger> {
        self.messenger.clone()
    }

    pub async fn seed_lead(&self, property_id: &str, phone: Option<&str>) -> Result<()> {
        self.store
            .insert_lead(NewLead {
                property_id: property_id.to_string(),
                display_id: format!("D-{property_id}"),
                title: format!("Listing {property_id}"),
                date_added: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                lister_name: "Ana Pop".to_string(),
                lister_phone: phone.map(str::to_string),
                lister_phone_normalized: phone
                    .map(|raw| backend::phone::normalize_with_country(raw, "40")),
                crm_raw: json!({ "id": property_id }),
            })
            .await?;
        Ok(())
    }

    pub async fn login_token(&self) -> Result<String> {
        let response = self
            .post_json("/api/login", &json!({ "password": TEST_PASSWORD }), None)
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let cookie = response
            .headers()
            .get("set-cookie")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| anyhow!("login response missing Set-Cookie"))?;
        let token = cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| anyhow!("malformed session cookie"))?;
        Ok(token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn get_with_cookie(&self, path: &str, token: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header("cookie", format!("crm_leads_token={token}"))
            .body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    Ok(body.collect().await?.to_bytes().to_vec())
}

#[allow(dead_code)]
pub fn listing(id: &str, date_added: &str) -> Value {
    json!({
        "id": id,
        "display_id": format!("D-{id}"),
        "title": format!("Listing {id}"),
        "date_added": date_added,
    })
}

#[allow(dead_code)]
pub fn contact(first: &str, last: &str, phone: &str) -> Contact {
    serde_json::from_value(json!({
        "first_name": first,
        "last_name": last,
        "phones": [{ "phone": phone }],
    }))
    .expect("valid contact fixture")
}
