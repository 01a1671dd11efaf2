mod common;

use anyhow::Result;
use axum::http::StatusCode;
use backend::models::{Direction, LeadStatus};
use backend::store::{LeadStore, OutreachUpdate};
use common::{body_to_vec, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn successful_outreach_marks_the_lead_and_records_the_message() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("800", Some("0712345678")).await?;
    app.store().set_unread_count("800", 3).await?;

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "800" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let store = app.store();
    let lead = store.get_lead("800").await?.expect("lead exists");
    assert_eq!(lead.status, LeadStatus::ReachedOut);
    assert_eq!(lead.unread_count, 0);
    assert_eq!(lead.outreach_history.len(), 1);
    assert!(lead.outreach_history[0].success);

    let messages = store.messages_for_lead("800").await?;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, Direction::Outbound);
    assert_eq!(messages[0].message_type, "template");
    assert_eq!(messages[0].status.as_deref(), Some("sent"));
    assert!(messages[0].message_id.is_some());

    let sends = app.messenger().sends().await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].recipient, "40712345678");
    assert_eq!(sends[0].template.as_deref(), Some("new_leads"));

    Ok(())
}

#[tokio::test]
async fn outreach_preconditions_reject_bad_leads() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "missing" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.seed_lead("801", None).await?;
    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "801" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.seed_lead("802", Some("+++")).await?;
    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "802" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn already_processed_leads_cannot_be_contacted_again() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("803", Some("0712345678")).await?;

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "803" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "803" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.messenger().sends().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn failed_send_moves_the_lead_to_error_without_a_message() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("804", Some("0712345678")).await?;
    app.messenger().fail_next(500, "token expired").await;

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "804" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let lead = app.store().get_lead("804").await?.expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Error);
    assert_eq!(lead.outreach_history.len(), 1);
    assert!(!lead.outreach_history[0].success);
    assert!(lead.outreach_history[0].note.is_some());
    assert!(app.store().messages_for_lead("804").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn unknown_template_names_fall_back_to_the_default() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("805", Some("0712345678")).await?;

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "805", "template_name": "not_a_template" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let sends = app.messenger().sends().await;
    assert_eq!(sends[0].template.as_deref(), Some("new_leads"));

    Ok(())
}

#[tokio::test]
async fn missing_whatsapp_configuration_leaves_the_lead_untouched() -> Result<()> {
    let app = TestApp::new_with(|config| {
        config.whatsapp_access_token = None;
    })?;
    let token = app.login_token().await?;
    app.seed_lead("806", Some("0712345678")).await?;

    let response = app
        .post_json(
            "/api/send-whatsapp",
            &json!({ "property_id": "806" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let lead = app.store().get_lead("806").await?.expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Lead);
    assert_eq!(lead.outreach_history.len(), 1);
    assert!(!lead.outreach_history[0].success);
    assert!(app.messenger().sends().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn manual_reply_records_a_text_message() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("807", Some("0712345678")).await?;

    let response = app
        .post_json(
            "/api/leads/807/reply",
            &json!({ "message": "We can schedule a viewing tomorrow." }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let store = app.store();
    let lead = store.get_lead("807").await?.expect("lead exists");
    assert_eq!(lead.status, LeadStatus::ReachedOut);

    let messages = store.messages_for_lead("807").await?;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, "text");
    assert_eq!(messages[0].body, "We can schedule a viewing tomorrow.");

    let sends = app.messenger().sends().await;
    assert_eq!(sends[0].kind, "text");
    assert_eq!(sends[0].recipient, "40712345678");

    Ok(())
}

#[tokio::test]
async fn rejected_reply_maps_to_bad_gateway_without_a_message() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("808", Some("0712345678")).await?;
    app.messenger().fail_next(400, "invalid recipient").await;

    let response = app
        .post_json(
            "/api/leads/808/reply",
            &json!({ "message": "Hello" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert!(app.store().messages_for_lead("808").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn reply_length_is_validated() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("809", Some("0712345678")).await?;

    let response = app
        .post_json(
            "/api/leads/809/reply",
            &json!({ "message": "" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/leads/809/reply",
            &json!({ "message": "x".repeat(4097) }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(app.messenger().sends().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn mark_read_clears_the_unread_counter() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("810", Some("0712345678")).await?;
    app.store().set_unread_count("810", 4).await?;

    let response = app
        .post_json("/api/leads/810/mark-read", &json!({}), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.store().get_lead("810").await?.expect("lead").unread_count,
        0
    );

    let response = app
        .post_json("/api/leads/missing/mark-read", &json!({}), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn lead_listings_are_split_by_status() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("811", Some("0712345678")).await?;
    app.seed_lead("812", Some("0722333444")).await?;

    let reached = app.store().get_lead("812").await?.expect("lead");
    app.store()
        .update_outreach(
            "812",
            OutreachUpdate {
                status: LeadStatus::ReachedOut,
                outreach_history: reached.outreach_history,
                lister_phone_normalized: None,
            },
        )
        .await?;

    let response = app.get("/api/leads/new", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let new_ids: Vec<&str> = body["leads"]
        .as_array()
        .unwrap()
        .iter()
        .map(|lead| lead["property_id"].as_str().unwrap())
        .collect();
    assert_eq!(new_ids, vec!["811"]);

    let response = app.get("/api/leads/history", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let history_ids: Vec<&str> = body["leads"]
        .as_array()
        .unwrap()
        .iter()
        .map(|lead| lead["property_id"].as_str().unwrap())
        .collect();
    assert_eq!(history_ids, vec!["812"]);

    Ok(())
}

#[tokio::test]
async fn conversation_endpoint_returns_messages_in_order() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;
    app.seed_lead("813", Some("0712345678")).await?;

    let response = app
        .post_json(
            "/api/leads/813/reply",
            &json!({ "message": "First" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .post_json(
            "/api/leads/813/reply",
            &json!({ "message": "Second" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/leads/813/messages", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let texts: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|message| message["message"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["First", "Second"]);

    let response = app.get("/api/leads/missing/messages", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn templates_endpoint_lists_the_allowed_templates() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.login_token().await?;

    let response = app.get("/api/templates", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let names: Vec<&str> = body["templates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|template| template["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["new_leads", "new_leads2"]);

    Ok(())
}
