use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    messaging::MessageRecorder,
    models::{Direction, Lead, LeadStatus, NewMessage, OutreachEntry},
    phone,
    poller::Poller,
    state::AppState,
    whatsapp::{self, SendError, TemplateInfo, WhatsAppSettings},
};

#[derive(Serialize)]
pub struct LeadOut {
    pub property_id: String,
    pub display_id: String,
    pub title: String,
    pub date_added: DateTime<Utc>,
    pub lister_name: String,
    pub lister_phone: Option<String>,
    pub status: LeadStatus,
    pub outreach_history: Vec<OutreachEntry>,
    pub crm_raw: Value,
    pub last_message_excerpt: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
}

impl From<Lead> for LeadOut {
    fn from(lead: Lead) -> Self {
        LeadOut {
            property_id: lead.property_id,
            display_id: lead.display_id,
            title: lead.title,
            date_added: lead.date_added,
            lister_name: lead.lister_name,
            lister_phone: lead.lister_phone,
            status: lead.status,
            outreach_history: lead.outreach_history,
            crm_raw: lead.crm_raw,
            last_message_excerpt: lead.last_message_excerpt,
            last_message_at: lead.last_message_at,
            unread_count: lead.unread_count,
        }
    }
}

#[derive(Serialize)]
pub struct LeadsResponse {
    pub leads: Vec<LeadOut>,
}

#[derive(Serialize)]
pub struct MessagePayload {
    pub id: Uuid,
    pub direction: Direction,
    pub message: String,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessagePayload>,
}

#[derive(Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<TemplateInfo>,
}

#[derive(Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct SendWhatsAppRequest {
    pub property_id: String,
    #[serde(default)]
    pub template_name: Option<String>,
}

#[derive(Deserialize)]
pub struct ReplyRequest {
    pub message: String,
}

/// Trigger one ingestion run. Called by the external scheduler.
pub async fn trigger_poll(State(state): State<AppState>) -> AppResult<Json<ActionResponse>> {
    let crm = state
        .crm
        .clone()
        .ok_or_else(|| AppError::internal("CRM_API_KEY is not configured"))?;

    let poller = Poller::new(
        state.store.clone(),
        crm,
        state.config.crm_ignore_before,
        state.config.default_country_dial_code.clone(),
    );
    let summary = poller.run().await.map_err(|err| {
        error!(error = %err, "poll run failed");
        AppError::internal(format!("Polling failed: {err}"))
    })?;

    Ok(Json(ActionResponse {
        success: true,
        message: Some(format!("Polling completed ({}).", summary.describe())),
    }))
}

pub async fn get_templates() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: whatsapp::AVAILABLE_TEMPLATES.to_vec(),
    })
}

pub async fn get_new_leads(State(state): State<AppState>) -> AppResult<Json<LeadsResponse>> {
    let leads = state.store.leads_by_status(LeadStatus::Lead).await?;
    Ok(Json(LeadsResponse {
        leads: leads.into_iter().map(LeadOut::from).collect(),
    }))
}

pub async fn get_history_leads(State(state): State<AppState>) -> AppResult<Json<LeadsResponse>> {
    let leads = state.store.leads_by_status(LeadStatus::ReachedOut).await?;
    Ok(Json(LeadsResponse {
        leads: leads.into_iter().map(LeadOut::from).collect(),
    }))
}

pub async fn get_lead_messages(
    State(state): State<AppState>,
    Path(property_id): Path<String>,
) -> AppResult<Json<MessagesResponse>> {
    if !state.store.lead_exists(&property_id).await? {
        return Err(AppError::not_found("Lead not found."));
    }

    let messages = state
        .store
        .messages_for_lead(&property_id)
        .await?
        .into_iter()
        .map(|message| MessagePayload {
            id: message.id,
            direction: message.direction,
            message: message.body,
            message_type: message.message_type,
            timestamp: message.sent_at,
            status: message.status,
        })
        .collect();

    Ok(Json(MessagesResponse { messages }))
}

pub async fn send_whatsapp(
    State(state): State<AppState>,
    Json(payload): Json<SendWhatsAppRequest>,
) -> AppResult<Json<ActionResponse>> {
    let lead = state
        .store
        .get_lead(&payload.property_id)
        .await?
        .ok_or_else(|| AppError::not_found("Lead not found."))?;

    if lead.status != LeadStatus::Lead {
        return Err(AppError::bad_request("Lead already processed."));
    }

    let Some(lister_phone) = lead.lister_phone.clone() else {
        return Err(AppError::bad_request("Lead is missing a phone number."));
    };

    let dial_code = state.config.default_country_dial_code.clone();
    let Some(recipient) = phone::format_recipient(&lister_phone, &dial_code) else {
        return Err(AppError::bad_request("Lead phone number is invalid."));
    };

    let settings = match WhatsAppSettings::from_config(&state.config) {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "outreach attempted without WhatsApp configuration");
            let history = append_history(&lead, false, Some("WhatsApp not configured"));
            state
                .store
                .update_outreach(
                    &lead.property_id,
                    crate::store::OutreachUpdate {
                        status: lead.status,
                        outreach_history: history,
                        lister_phone_normalized: None,
                    },
                )
                .await?;
            return Err(AppError::internal("WhatsApp Cloud API not configured."));
        }
    };

    let mut template = payload
        .template_name
        .unwrap_or_else(|| settings.template_name.clone());
    if !whatsapp::is_known_template(&template) {
        warn!(template = %template, "template not in allowed list; using default");
        template = settings.template_name.clone();
    }

    let components =
        whatsapp::template_components(&lead, settings.personal_link.as_deref(), settings.parameter_count);

    let receipt = match state
        .messenger
        .send_template(&settings, &recipient, &template, &components)
        .await
    {
        Ok(receipt) => receipt,
        Err(err) => {
            error!(property_id = %lead.property_id, error = %err, "WhatsApp template send failed");
            let note = match err {
                SendError::Transport(_) => "WhatsApp API request failed",
                _ => "WhatsApp API error",
            };
            let history = append_history(&lead, false, Some(note));
            state
                .store
                .update_outreach(
                    &lead.property_id,
                    crate::store::OutreachUpdate {
                        status: LeadStatus::Error,
                        outreach_history: history,
                        lister_phone_normalized: None,
                    },
                )
                .await?;
            return Err(AppError::internal(format!("{note}.")));
        }
    };

    let preview = whatsapp::template_preview(
        &lead,
        &template,
        settings.personal_link.as_deref(),
        settings.parameter_count,
    );

    let recorder = MessageRecorder::new(state.store.clone());
    recorder
        .record(
            &lead.property_id,
            NewMessage {
                direction: Direction::Outbound,
                body: preview,
                message_type: "template".to_string(),
                sent_at: Utc::now(),
                status: Some("sent".to_string()),
                message_id: receipt.message_id.clone(),
                raw: Some(json!({
                    "request": receipt.request,
                    "response": receipt.response,
                })),
            },
            true,
        )
        .await?;

    let history = append_history(&lead, true, None);
    state
        .store
        .update_outreach(
            &lead.property_id,
            crate::store::OutreachUpdate {
                status: LeadStatus::ReachedOut,
                outreach_history: history,
                lister_phone_normalized: Some(phone::normalize_with_country(
                    &lister_phone,
                    &dial_code,
                )),
            },
        )
        .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: Some("WhatsApp message sent.".to_string()),
    }))
}

pub async fn send_manual_reply(
    State(state): State<AppState>,
    Path(property_id): Path<String>,
    Json(payload): Json<ReplyRequest>,
) -> AppResult<Json<ActionResponse>> {
    if payload.message.is_empty() || payload.message.chars().count() > 4096 {
        return Err(AppError::bad_request(
            "message must be between 1 and 4096 characters",
        ));
    }

    let lead = state
        .store
        .get_lead(&property_id)
        .await?
        .ok_or_else(|| AppError::not_found("Lead not found."))?;

    let dial_code = state.config.default_country_dial_code.clone();
    let recipient = lead
        .lister_phone
        .as_deref()
        .and_then(|raw| phone::format_recipient(raw, &dial_code))
        .ok_or_else(|| AppError::bad_request("Lead phone number is invalid."))?;

    let settings = WhatsAppSettings::from_config(&state.config).map_err(AppError::internal)?;

    let receipt = match state
        .messenger
        .send_text(&settings, &recipient, &payload.message)
        .await
    {
        Ok(receipt) => receipt,
        Err(SendError::Transport(err)) => {
            error!(property_id = %property_id, error = %err, "failed to reach WhatsApp API");
            return Err(AppError::unavailable("Failed to reach WhatsApp API."));
        }
        Err(err) => {
            error!(property_id = %property_id, error = %err, "WhatsApp API rejected manual reply");
            return Err(AppError::bad_gateway("WhatsApp API returned an error."));
        }
    };

    let recorder = MessageRecorder::new(state.store.clone());
    recorder
        .record(
            &property_id,
            NewMessage {
                direction: Direction::Outbound,
                body: payload.message,
                message_type: "text".to_string(),
                sent_at: Utc::now(),
                status: Some("sent".to_string()),
                message_id: receipt.message_id.clone(),
                raw: Some(json!({
                    "request": receipt.request,
                    "response": receipt.response,
                })),
            },
            true,
        )
        .await?;

    let normalized = lead
        .lister_phone
        .as_deref()
        .map(|raw| phone::normalize_with_country(raw, &dial_code));
    state
        .store
        .update_outreach(
            &property_id,
            crate::store::OutreachUpdate {
                status: LeadStatus::ReachedOut,
                outreach_history: lead.outreach_history,
                lister_phone_normalized: normalized,
            },
        )
        .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: Some("Reply sent.".to_string()),
    }))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(property_id): Path<String>,
) -> AppResult<Json<ActionResponse>> {
    if !state.store.lead_exists(&property_id).await? {
        return Err(AppError::not_found("Lead not found."));
    }

    state.store.set_unread_count(&property_id, 0).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: Some("Conversation marked as read.".to_string()),
    }))
}

fn append_history(lead: &Lead, success: bool, note: Option<&str>) -> Vec<OutreachEntry> {
    let mut history = lead.outreach_history.clone();
    history.push(OutreachEntry {
        date: Utc::now(),
        success,
        note: note.map(str::to_string),
    });
    history
}
