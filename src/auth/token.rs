use rand::{rngs::OsRng, Rng};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::users::repo::{SessionToken, User};

// 64-symbol alphabet at 32 characters keeps the collision probability
// negligible for any realistic deployment.
const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz-0123456789";
pub const TOKEN_LENGTH: usize = 32;

pub const SESSION_TOKEN_LIFETIME: Duration = Duration::days(30);
pub const RESET_TOKEN_LIFETIME: Duration = Duration::hours(8);

/// Generates an opaque random token string.
pub fn generate_token() -> String {
    let mut rng = OsRng;
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Issues a fresh session token for a user, replacing any existing one. The
/// upsert keyed by user handle makes the replacement atomic with respect to
/// concurrent issuance for the same user.
pub async fn issue(db: &PgPool, handle: &str) -> anyhow::Result<SessionToken> {
    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + SESSION_TOKEN_LIFETIME;
    sqlx::query(
        r#"
        INSERT INTO user_tokens (token, user_handle, expires_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_handle)
        DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at
        "#,
    )
    .bind(&token)
    .bind(handle)
    .bind(expires_at)
    .execute(db)
    .await?;
    debug!(handle, "session token issued");
    Ok(SessionToken { token, expires_at })
}

/// Resolves the user owning a live token record matching `token` exactly.
/// Absence is a normal outcome, not an error.
pub async fn resolve(db: &PgPool, token: &str) -> anyhow::Result<Option<User>> {
    crate::users::repo::find_user_by_token(db, token).await
}

/// Lazy refresh: clients authenticate with whatever token they hold, and a
/// missing/expired token (or a forced rotation after password change) is
/// replaced transparently on the next access.
pub async fn ensure_fresh(db: &PgPool, mut user: User, force: bool) -> anyhow::Result<User> {
    let stale = match &user.token {
        None => true,
        Some(t) => force || t.expires_at < OffsetDateTime::now_utc(),
    };
    if stale {
        user.token = Some(issue(db, &user.handle).await?);
    }
    Ok(user)
}
