use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{password, SESSION_COOKIE_NAME},
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    if payload.password.is_empty() {
        return Err(AppError::bad_request("password must not be empty"));
    }

    let configured_hash = state
        .config
        .dashboard_password_hash
        .as_deref()
        .ok_or_else(|| AppError::internal("DASHBOARD_PASSWORD_HASH is not configured"))?;

    let valid = password::verify_password(&payload.password, configured_hash)
        .map_err(AppError::internal)?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let token = state.jwt.generate_token("dashboard_admin")?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_session_cookie(&token, state.jwt.expiry_seconds()),
    );

    Ok((headers, Json(LoginResponse { success: true })))
}

/// Dashboard and API live on different origins, so the session cookie has
/// to be SameSite=None and therefore Secure.
fn build_session_cookie(token: &str, max_age: i64) -> HeaderValue {
    let parts = [
        format!("{SESSION_COOKIE_NAME}={token}"),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=None".to_string(),
        "Secure".to_string(),
        format!("Max-Age={max_age}"),
    ];

    HeaderValue::from_str(&parts.join("; ")).expect("valid session cookie")
}
