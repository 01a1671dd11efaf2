//! WhatsApp webhook endpoints: the Meta verification handshake and the
//! event receiver for inbound messages and delivery-status updates.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    messaging::{LeadResolver, MessageRecorder, StatusCorrelator},
    models::{Direction, NewMessage},
    state::AppState,
};

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Meta calls this once when the webhook URL is registered. Echo the
/// challenge only when the shared token matches.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> AppResult<impl IntoResponse> {
    let expected = state.config.whatsapp_webhook_verify_token.as_deref();
    let mode_ok = params.mode.as_deref() == Some("subscribe");
    let token_ok = expected.is_some() && params.verify_token.as_deref() == expected;

    if mode_ok && token_ok {
        if let Some(challenge) = params.challenge {
            return Ok(challenge.into_response());
        }
    }

    warn!(mode = ?params.mode, "webhook verification rejected");
    Err(AppError::forbidden("Verification failed."))
}

#[derive(Deserialize, Default)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Deserialize, Default)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Deserialize, Default)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Deserialize, Default)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub statuses: Vec<StatusEvent>,
}

#[derive(Deserialize, Default)]
pub struct WebhookContact {
    pub wa_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct StatusEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub timestamp: Option<String>,
}

/// Event receiver. Each message or status is handled independently so one
/// malformed item never blocks the rest of the batch; Meta retries the
/// whole payload on a non-2xx response.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> Json<Value> {
    let resolver = LeadResolver::new(
        state.store.clone(),
        state.config.default_country_dial_code.clone(),
    );
    let recorder = MessageRecorder::new(state.store.clone());
    let correlator = StatusCorrelator::new(state.store.clone());

    for entry in envelope.entry {
        for change in entry.changes {
            let value = change.value;
            let default_sender = value
                .contacts
                .first()
                .and_then(|contact| contact.wa_id.clone());

            for message in value.messages {
                if let Err(err) =
                    handle_inbound_message(&state, &resolver, &recorder, &message, &default_sender)
                        .await
                {
                    warn!(error = %err, "failed to process inbound message");
                }
            }

            for status in value.statuses {
                let at = status
                    .timestamp
                    .as_deref()
                    .map(parse_epoch_timestamp)
                    .unwrap_or_else(Utc::now);
                if let Err(err) = correlator
                    .apply(status.id.as_deref(), status.status.as_deref(), at)
                    .await
                {
                    warn!(error = %err, "failed to process status update");
                }
            }
        }
    }

    Json(json!({ "success": true }))
}

async fn handle_inbound_message(
    state: &AppState,
    resolver: &LeadResolver,
    recorder: &MessageRecorder,
    message: &Value,
    default_sender: &Option<String>,
) -> anyhow::Result<()> {
    // The change-level contact entry is authoritative; the per-message
    // `from` field only fills in when no contact was attached.
    let sender = default_sender.clone().filter(|s| !s.is_empty()).or_else(|| {
        message
            .get("from")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let Some(sender) = sender.filter(|s| !s.is_empty()) else {
        warn!("inbound message without a sender identifier");
        return Ok(());
    };

    let Some(lead) = resolver.resolve(&sender).await? else {
        warn!(sender = %sender, "inbound message from unknown sender");
        return Ok(());
    };

    let message_type = message
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let Some(body) = extract_message_body(message) else {
        info!(
            property_id = %lead.property_id,
            message_type = %message_type,
            "inbound message without extractable text"
        );
        return Ok(());
    };

    let sent_at = message
        .get("timestamp")
        .and_then(Value::as_str)
        .map(parse_epoch_timestamp)
        .unwrap_or_else(Utc::now);
    let message_id = message
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);

    recorder
        .record(
            &lead.property_id,
            NewMessage {
                direction: Direction::Inbound,
                body,
                message_type: message_type.to_string(),
                sent_at,
                status: None,
                message_id,
                raw: Some(message.clone()),
            },
            false,
        )
        .await?;

    // The sender string that just matched is the freshest canonical form.
    let canonical = crate::phone::normalize_with_country(
        &sender,
        &state.config.default_country_dial_code,
    );
    if !canonical.is_empty() && lead.lister_phone_normalized.as_deref() != Some(canonical.as_str())
    {
        state
            .store
            .set_normalized_phone(&lead.property_id, &canonical)
            .await?;
    }

    Ok(())
}

/// Webhook timestamps arrive as epoch seconds in a string field.
pub(crate) fn parse_epoch_timestamp(raw: &str) -> DateTime<Utc> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

/// Pulls display text out of the message shapes the dashboard can render:
/// plain text, button taps, and interactive replies.
pub(crate) fn extract_message_body(message: &Value) -> Option<String> {
    let text = match message.get("type").and_then(Value::as_str) {
        Some("text") => message
            .get("text")
            .and_then(|t| t.get("body"))
            .and_then(Value::as_str),
        Some("button") => message
            .get("button")
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str),
        Some("interactive") => {
            let interactive = message.get("interactive")?;
            interactive
                .get("button_reply")
                .and_then(|r| r.get("title"))
                .and_then(Value::as_str)
                .or_else(|| {
                    interactive
                        .get("list_reply")
                        .and_then(|r| r.get("title"))
                        .and_then(Value::as_str)
                })
        }
        _ => None,
    };

    text.filter(|body| !body.is_empty()).map(str::to_string)
}
