use serde::Deserialize;

use crate::auth::role::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Minimum role required to create users through POST /users.
    pub user_creation_role: Role,
    /// Base URL the reset link in recovery emails points at.
    pub frontend_url: String,
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let user_creation_role = std::env::var("USER_CREATION_ROLE")
            .ok()
            .and_then(|v| v.parse::<Role>().ok())
            .unwrap_or(Role::Mod);
        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());

        // Recovery mail is optional; without SMTP_SERVER the forgot-password
        // route reports the feature as unconfigured.
        let smtp = match std::env::var("SMTP_SERVER") {
            Ok(server) => Some(SmtpConfig {
                server,
                username: std::env::var("SMTP_USERNAME")?,
                password: std::env::var("SMTP_PASSWORD")?,
                from: std::env::var("SMTP_FROM")?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            user_creation_role,
            frontend_url,
            smtp,
        })
    }
}
