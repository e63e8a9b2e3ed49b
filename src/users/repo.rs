use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::auth::role::Role;

/// Full user record as loaded for authorization decisions. The password hash
/// and token never leave the process through this type directly; responses go
/// through the DTOs in `users::dto`.
#[derive(Debug, Clone)]
pub struct User {
    pub handle: String,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub password_hash: String,
    pub last_signed_in: Option<OffsetDateTime>,
    pub token: Option<SessionToken>,
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Public projection embedded in list responses and user listings.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct MinimalUser {
    pub handle: String,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn minimal(&self) -> MinimalUser {
        MinimalUser {
            handle: self.handle.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    handle: String,
    name: String,
    role: Role,
    email: Option<String>,
    password_hash: String,
    last_signed_in: Option<OffsetDateTime>,
    token: Option<String>,
    token_expires_at: Option<OffsetDateTime>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let token = match (row.token, row.token_expires_at) {
            (Some(token), Some(expires_at)) => Some(SessionToken { token, expires_at }),
            _ => None,
        };
        User {
            handle: row.handle,
            name: row.name,
            role: row.role,
            email: row.email,
            password_hash: row.password_hash,
            last_signed_in: row.last_signed_in,
            token,
        }
    }
}

const USER_SELECT: &str = r#"
    SELECT u.handle, u.name, u.role, u.email, u.password_hash, u.last_signed_in,
           t.token AS token, t.expires_at AS token_expires_at
    FROM users u
    LEFT JOIN user_tokens t ON t.user_handle = u.handle
"#;

#[derive(Debug, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
}

/// Clamps client-supplied pagination to non-negative bounds and derives the
/// row offset. Page numbers below 1 collapse to the first page.
fn page_window(limit: Option<i64>, page: Option<i64>) -> (Option<i64>, i64) {
    let limit = limit.map(|l| l.max(0));
    let offset = match (limit, page) {
        (Some(limit), Some(page)) if page > 1 => limit.saturating_mul(page - 1),
        _ => 0,
    };
    (limit, offset)
}

pub async fn find_users(
    db: &PgPool,
    filter: UserFilter,
    limit: Option<i64>,
    page: Option<i64>,
) -> anyhow::Result<Vec<MinimalUser>> {
    let (limit, offset) = page_window(limit, page);
    let users = sqlx::query_as::<_, MinimalUser>(
        r#"
        SELECT handle, name, role
        FROM users
        WHERE ($1::text IS NULL
               OR (CASE WHEN left($1, 1) = '@'
                        THEN handle = lower(substr($1, 2))
                        ELSE handle ILIKE '%' || $1 || '%' OR name ILIKE '%' || $1 || '%'
                   END))
          AND ($2::user_role IS NULL OR role = $2)
        ORDER BY name ASC, handle ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(filter.search)
    .bind(filter.role)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(users)
}

/// Looks a user up by handle, case-insensitively.
pub async fn find_user(db: &PgPool, handle: &str) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.handle = lower($1)"))
        .bind(handle)
        .fetch_optional(db)
        .await?;
    Ok(row.map(User::from))
}

/// Exact-match lookup by session token string; no prefix matching.
pub async fn find_user_by_token(db: &PgPool, token: &str) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE t.token = $1"))
        .bind(token)
        .fetch_optional(db)
        .await?;
    Ok(row.map(User::from))
}

pub async fn find_user_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.email = $1"))
        .bind(email)
        .fetch_optional(db)
        .await?;
    Ok(row.map(User::from))
}

/// Inserts a new user. The caller supplies an already-hashed password; the
/// handle is stored lowercased. Surfaces the raw sqlx error so the boundary
/// can translate uniqueness violations.
pub async fn create_user(
    db: &PgPool,
    handle: &str,
    name: &str,
    email: Option<&str>,
    role: Role,
    password_hash: &str,
    set_sign_in: bool,
) -> Result<User, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (handle, name, role, email, password_hash, last_signed_in)
        VALUES (lower($1), $2, $3, $4, $5, CASE WHEN $6 THEN now() ELSE NULL END)
        RETURNING handle, name, role, email, password_hash, last_signed_in,
                  NULL AS token, NULL::timestamptz AS token_expires_at
        "#,
    )
    .bind(handle)
    .bind(name)
    .bind(role)
    .bind(email)
    .bind(password_hash)
    .bind(set_sign_in)
    .fetch_one(db)
    .await?;
    Ok(User::from(row))
}

/// Partial profile update; untouched columns keep their values. Returns the
/// raw sqlx error for 409 translation on email collisions.
pub async fn update_user(
    db: &PgPool,
    handle: &str,
    name: Option<&str>,
    email: Option<&str>,
    role: Option<Role>,
    password_hash: Option<&str>,
) -> Result<User, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        WITH updated AS (
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                password_hash = COALESCE($5, password_hash),
                updated_at = now()
            WHERE handle = lower($1)
            RETURNING handle, name, role, email, password_hash, last_signed_in
        )
        SELECT u.handle, u.name, u.role, u.email, u.password_hash, u.last_signed_in,
               t.token AS token, t.expires_at AS token_expires_at
        FROM updated u
        LEFT JOIN user_tokens t ON t.user_handle = u.handle
        "#,
    )
    .bind(handle)
    .bind(name)
    .bind(email)
    .bind(role)
    .bind(password_hash)
    .fetch_one(db)
    .await?;
    Ok(User::from(row))
}

pub async fn set_last_signed_in(db: &PgPool, handle: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET last_signed_in = now() WHERE handle = $1")
        .bind(handle)
        .execute(db)
        .await?;
    Ok(())
}

#[derive(Debug, FromRow)]
pub struct ResetToken {
    pub user_handle: String,
    pub secret_hash: String,
    pub valid_until: OffsetDateTime,
}

/// At most one live reset token per user; a new request supersedes the old.
pub async fn upsert_reset_token(
    db: &PgPool,
    handle: &str,
    secret_hash: &str,
    valid_until: OffsetDateTime,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reset_tokens (user_handle, secret_hash, valid_until)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_handle)
        DO UPDATE SET secret_hash = excluded.secret_hash, valid_until = excluded.valid_until
        "#,
    )
    .bind(handle)
    .bind(secret_hash)
    .bind(valid_until)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_reset_token(db: &PgPool, handle: &str) -> anyhow::Result<Option<ResetToken>> {
    let row = sqlx::query_as::<_, ResetToken>(
        "SELECT user_handle, secret_hash, valid_until FROM reset_tokens WHERE user_handle = $1",
    )
    .bind(handle)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn delete_reset_token(db: &PgPool, handle: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM reset_tokens WHERE user_handle = $1")
        .bind(handle)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_defaults_to_no_offset() {
        assert_eq!(page_window(None, None), (None, 0));
        assert_eq!(page_window(Some(20), None), (Some(20), 0));
        assert_eq!(page_window(Some(20), Some(1)), (Some(20), 0));
        assert_eq!(page_window(Some(20), Some(3)), (Some(20), 40));
    }

    #[test]
    fn page_window_neutralizes_hostile_input() {
        // Negative limits collapse to zero rows rather than a SQL error.
        assert_eq!(page_window(Some(-5), Some(2)), (Some(0), 0));
        // Pages below 1 read as the first page.
        assert_eq!(page_window(Some(20), Some(0)), (Some(20), 0));
        assert_eq!(page_window(Some(20), Some(-3)), (Some(20), 0));
        // Extreme values saturate instead of overflowing.
        assert_eq!(page_window(Some(i64::MAX), Some(i64::MAX)), (Some(i64::MAX), i64::MAX));
    }
}
