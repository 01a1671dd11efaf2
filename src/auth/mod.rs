pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization, Cookie};
use axum_extra::TypedHeader;

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE_NAME: &str = "crm_leads_token";

/// The dashboard operator, authenticated via the session cookie or a
/// Bearer header carrying the same token.
#[derive(Debug, Clone)]
pub struct AuthenticatedOperator {
    pub subject: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedOperator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let mut token = match TypedHeader::<Cookie>::from_request_parts(parts, state).await {
            Ok(TypedHeader(cookies)) => cookies.get(SESSION_COOKIE_NAME).map(str::to_string),
            Err(_) => None,
        };

        if token.is_none() {
            token = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .ok()
                .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());
        }

        let token = token.ok_or_else(AppError::unauthorized)?;
        let claims = state
            .jwt
            .verify_token(&token)
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedOperator {
            subject: claims.sub,
        })
    }
}
