use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use time::OffsetDateTime;

use crate::{auth::token, error::ApiError, state::AppState, users::repo::User};

/// Authenticates the incoming request from the Authorization header and
/// resolves the caller through the token store. Missing header, unknown
/// token, and expired token are distinct failures (400 / 404 / 401).
pub struct Caller(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("No token provided"))?;

        // Clients send the raw token; a Bearer prefix is tolerated.
        let presented = header.strip_prefix("Bearer ").unwrap_or(header);

        let user = token::resolve(&state.db, presented)
            .await?
            .ok_or_else(|| ApiError::not_found("No user with that token exists"))?;

        let live = user
            .token
            .as_ref()
            .is_some_and(|t| t.expires_at >= OffsetDateTime::now_utc());
        if !live {
            return Err(ApiError::unauthorized("Session has expired"));
        }

        Ok(Caller(user))
    }
}
