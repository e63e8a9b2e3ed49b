use sqlx::{FromRow, PgPool};

use crate::auth::{password, token};

/// The generator secret is a singleton row; rotating it overwrites the hash
/// and records who generated it.
pub const USER_GENERATOR_SECRET: &str = "USER_GENERATOR_SECRET";

#[derive(Debug, FromRow)]
pub struct Secret {
    pub secret_hash: String,
    pub generated_by: Option<String>,
}

pub async fn get_generator_secret(db: &PgPool) -> anyhow::Result<Option<Secret>> {
    let secret = sqlx::query_as::<_, Secret>(
        "SELECT secret_hash, generated_by FROM secrets WHERE id = $1",
    )
    .bind(USER_GENERATOR_SECRET)
    .fetch_optional(db)
    .await?;
    Ok(secret)
}

/// Rotates the shared signup secret and returns the new plaintext; only the
/// hash is persisted.
pub async fn rotate_generator_secret(db: &PgPool, creator_handle: &str) -> anyhow::Result<String> {
    let plaintext = token::generate_token();
    let secret_hash = password::hash_secret(&plaintext)?;
    sqlx::query(
        r#"
        INSERT INTO secrets (id, secret_hash, generated_by)
        VALUES ($1, $2, $3)
        ON CONFLICT (id)
        DO UPDATE SET secret_hash = excluded.secret_hash, generated_by = excluded.generated_by
        "#,
    )
    .bind(USER_GENERATOR_SECRET)
    .bind(&secret_hash)
    .bind(creator_handle)
    .execute(db)
    .await?;
    Ok(plaintext)
}
