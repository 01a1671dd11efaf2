//! Outbound messaging through the WhatsApp Cloud (Graph) API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::Lead;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Templates the dashboard may pick from. Anything outside this list falls
/// back to the configured default at send time.
pub const AVAILABLE_TEMPLATES: &[TemplateInfo] = &[
    TemplateInfo {
        name: "new_leads",
        display_name: "Template 1",
    },
    TemplateInfo {
        name: "new_leads2",
        display_name: "Template 2",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub name: &'static str,
    pub display_name: &'static str,
}

pub fn is_known_template(name: &str) -> bool {
    AVAILABLE_TEMPLATES.iter().any(|t| t.name == name)
}

/// Credentials and template identity for one send, validated together so
/// a misconfiguration names every missing variable at once.
#[derive(Debug, Clone)]
pub struct WhatsAppSettings {
    pub phone_number_id: String,
    pub access_token: String,
    pub template_name: String,
    pub language: String,
    pub personal_link: Option<String>,
    pub parameter_count: usize,
}

impl WhatsAppSettings {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut missing = Vec::new();
        if config.whatsapp_phone_number_id.is_none() {
            missing.push("WHATSAPP_PHONE_NUMBER_ID");
        }
        if config.whatsapp_template_name.is_none() {
            missing.push("WHATSAPP_TEMPLATE_NAME");
        }
        if config.whatsapp_access_token.is_none() {
            missing.push("WHATSAPP_ACCESS_TOKEN");
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "WhatsApp Cloud API is not fully configured. Missing: {}",
                missing.join(", ")
            );
        }

        Ok(Self {
            phone_number_id: config.whatsapp_phone_number_id.clone().unwrap_or_default(),
            access_token: config.whatsapp_access_token.clone().unwrap_or_default(),
            template_name: config.whatsapp_template_name.clone().unwrap_or_default(),
            language: config.whatsapp_template_language.clone(),
            personal_link: config.personal_whatsapp_link.clone(),
            parameter_count: config.whatsapp_template_parameter_count,
        })
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("messaging API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("messaging API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

/// Outcome of an accepted send. Request and response bodies are kept
/// verbatim for the message audit field.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: Option<String>,
    pub request: Value,
    pub response: Value,
}

#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    async fn send_template(
        &self,
        settings: &WhatsAppSettings,
        recipient: &str,
        template: &str,
        components: &[Value],
    ) -> Result<SendReceipt, SendError>;

    async fn send_text(
        &self,
        settings: &WhatsAppSettings,
        recipient: &str,
        body: &str,
    ) -> Result<SendReceipt, SendError>;
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build Graph API client: {err}"))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_message(
        &self,
        settings: &WhatsAppSettings,
        request: Value,
    ) -> Result<SendReceipt, SendError> {
        let url = format!("{}/{}/messages", self.base_url, settings.phone_number_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&settings.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_body = response.json::<Value>().await.unwrap_or(Value::Null);
        let message_id = extract_message_id(&response_body);
        Ok(SendReceipt {
            message_id,
            request,
            response: response_body,
        })
    }
}

#[async_trait]
impl Messenger for GraphClient {
    async fn send_template(
        &self,
        settings: &WhatsAppSettings,
        recipient: &str,
        template: &str,
        components: &[Value],
    ) -> Result<SendReceipt, SendError> {
        let request = template_request(recipient, template, &settings.language, components);
        self.post_message(settings, request).await
    }

    async fn send_text(
        &self,
        settings: &WhatsAppSettings,
        recipient: &str,
        body: &str,
    ) -> Result<SendReceipt, SendError> {
        let request = text_request(recipient, body);
        self.post_message(settings, request).await
    }
}

pub fn template_request(
    recipient: &str,
    template: &str,
    language: &str,
    components: &[Value],
) -> Value {
    let mut template_body = json!({
        "name": template,
        "language": { "code": language },
    });
    if !components.is_empty() {
        template_body["components"] = Value::Array(components.to_vec());
    }
    json!({
        "messaging_product": "whatsapp",
        "to": recipient,
        "type": "template",
        "template": template_body,
    })
}

pub fn text_request(recipient: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": recipient,
        "type": "text",
        "text": { "preview_url": false, "body": body },
    })
}

pub fn extract_message_id(response: &Value) -> Option<String> {
    response
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.first())
        .and_then(|message| message.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Positional body parameters for the outreach template: lister name,
/// listing title, personal link; padded with empty strings when the
/// template expects more.
pub fn template_components(
    lead: &Lead,
    personal_link: Option<&str>,
    parameter_count: usize,
) -> Vec<Value> {
    if parameter_count == 0 {
        return Vec::new();
    }

    let mut parameters: Vec<Value> = Vec::new();

    if parameter_count >= 1 {
        let name = non_empty_or(&lead.lister_name, "there");
        parameters.push(json!({ "type": "text", "text": name }));
    }
    if parameter_count >= 2 {
        let title = non_empty_or(&lead.title, "your property");
        parameters.push(json!({ "type": "text", "text": title }));
    }
    if parameter_count >= 3 {
        let link = personal_link
            .map(str::to_string)
            .or_else(|| {
                lead.crm_raw
                    .get("listing_link")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        parameters.push(json!({ "type": "text", "text": link }));
    }
    while parameters.len() < parameter_count {
        parameters.push(json!({ "type": "text", "text": "" }));
    }

    vec![json!({ "type": "body", "parameters": parameters })]
}

/// Human-readable stand-in for the rendered template, stored as the
/// outbound message body (the Graph API does not echo rendered text back).
pub fn template_preview(
    lead: &Lead,
    template: &str,
    personal_link: Option<&str>,
    parameter_count: usize,
) -> String {
    if parameter_count == 0 {
        return format!("Template sent: {template}");
    }

    let name = non_empty_or(&lead.lister_name, "there");
    let title = non_empty_or(&lead.title, "your property");
    let mut preview = format!("Hi {name}, we saw your new listing for {title} is live!");
    if parameter_count >= 3 {
        if let Some(link) = personal_link.filter(|link| !link.is_empty()) {
            preview = format!("{preview} {link}");
        }
    }
    preview
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
