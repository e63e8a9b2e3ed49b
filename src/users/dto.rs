use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    auth::role::Role,
    error::ApiError,
    users::repo::User,
    validate,
};

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub handle: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl CreateUser {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !validate::is_valid_handle(&self.handle) {
            return Err(ApiError::validation(
                "Username can only contain alphanumeric characters, dash, and underscore",
            ));
        }
        if let Some(email) = &self.email {
            if !validate::is_valid_email(email) {
                return Err(ApiError::validation("Provided properties can not create a user"));
            }
        }
        Ok(())
    }
}

/// Self-service signup gated by the shared generator secret; no role grant.
#[derive(Debug, Deserialize)]
pub struct CreateUserWithSecret {
    pub handle: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

impl CreateUserWithSecret {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !validate::is_valid_handle(&self.handle) {
            return Err(ApiError::validation(
                "Username can only contain alphanumeric characters, dash, and underscore",
            ));
        }
        if let Some(email) = &self.email {
            if !validate::is_valid_email(email) {
                return Err(ApiError::validation("Provided properties can not create a user"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
}

impl UpdateUser {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(email) = &self.email {
            if !validate::is_valid_email(email) {
                return Err(ApiError::validation("Provided properties can not edit a user"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewSecretRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDto {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// User as returned to clients. The password hash never appears; the session
/// token only appears in self-facing responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub handle: String,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_signed_in: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenDto>,
}

impl UserResponse {
    /// Projection for responses about other users: no token.
    pub fn public(user: User) -> Self {
        Self::build(user, false)
    }

    /// Projection for the caller's own user: includes the session token.
    pub fn with_token(user: User) -> Self {
        Self::build(user, true)
    }

    fn build(user: User, include_token: bool) -> Self {
        UserResponse {
            handle: user.handle,
            name: user.name,
            role: user.role,
            email: user.email,
            last_signed_in: user.last_signed_in,
            token: if include_token {
                user.token.map(|t| TokenDto {
                    token: t.token,
                    expires_at: t.expires_at,
                })
            } else {
                None
            },
        }
    }
}
