use std::collections::HashMap;

use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;

use crate::{
    auth::role::Role,
    lists::dto::{Area, ListSummary},
    lists::engine,
    users::repo::MinimalUser,
};

/// A fully loaded list with its creator and owner resolved. The lifecycle
/// engine mutates values of this type; the repo persists them.
#[derive(Debug, Clone)]
pub struct List {
    pub id: i64,
    pub kind: String,
    pub version: String,
    pub structure: Vec<Area>,
    pub fields: HashMap<String, bool>,
    pub colors: Option<HashMap<String, String>>,
    pub responsible: Option<String>,
    pub phone_number: Option<String>,
    pub event_date: Option<String>,
    pub comment: Option<String>,
    pub submitted_at: Option<OffsetDateTime>,
    pub verified: Option<Verification>,
    pub created_by: MinimalUser,
    pub owned_by: MinimalUser,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verified_by: String,
    pub verified_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct ListRow {
    id: i64,
    kind: String,
    version: String,
    structure: Json<Vec<Area>>,
    fields: Json<HashMap<String, bool>>,
    colors: Option<Json<HashMap<String, String>>>,
    responsible: Option<String>,
    phone_number: Option<String>,
    event_date: Option<String>,
    comment: Option<String>,
    submitted_at: Option<OffsetDateTime>,
    verified_by: Option<String>,
    verified_at: Option<OffsetDateTime>,
    updated_at: OffsetDateTime,
    created_by_handle: String,
    created_by_name: String,
    created_by_role: Role,
    owned_by_handle: String,
    owned_by_name: String,
    owned_by_role: Role,
}

impl From<ListRow> for List {
    fn from(row: ListRow) -> Self {
        let verified = match (row.verified_by, row.verified_at) {
            (Some(verified_by), Some(verified_at)) => Some(Verification {
                verified_by,
                verified_at,
            }),
            _ => None,
        };
        List {
            id: row.id,
            kind: row.kind,
            version: row.version,
            structure: row.structure.0,
            fields: row.fields.0,
            colors: row.colors.map(|c| c.0),
            responsible: row.responsible,
            phone_number: row.phone_number,
            event_date: row.event_date,
            comment: row.comment,
            submitted_at: row.submitted_at,
            verified,
            created_by: MinimalUser {
                handle: row.created_by_handle,
                name: row.created_by_name,
                role: row.created_by_role,
            },
            owned_by: MinimalUser {
                handle: row.owned_by_handle,
                name: row.owned_by_name,
                role: row.owned_by_role,
            },
            updated_at: row.updated_at,
        }
    }
}

const LIST_SELECT: &str = r#"
    SELECT l.id, l.type AS kind, l.version, l.structure, l.fields, l.colors,
           l.responsible, l.phone_number, l.event_date, l.comment,
           l.submitted_at, l.verified_by, l.verified_at, l.updated_at,
           cb.handle AS created_by_handle, cb.name AS created_by_name, cb.role AS created_by_role,
           ob.handle AS owned_by_handle, ob.name AS owned_by_name, ob.role AS owned_by_role
    FROM lists l
    JOIN users cb ON cb.handle = l.created_by
    JOIN users ob ON ob.handle = l.owned_by
"#;

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: i64,
    kind: String,
    version: String,
    event_date: Option<String>,
    submitted_at: Option<OffsetDateTime>,
    verified_at: Option<OffsetDateTime>,
}

pub async fn find_lists(db: &PgPool) -> anyhow::Result<Vec<ListSummary>> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT id, type AS kind, version, event_date, submitted_at, verified_at
        FROM lists
        ORDER BY updated_at DESC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| ListSummary {
            id: row.id,
            kind: row.kind,
            version: row.version,
            event_date: row.event_date,
            status: engine::status(row.submitted_at, row.verified_at.is_some()),
            submitted_at: row.submitted_at,
            verified: row.verified_at.is_some(),
        })
        .collect())
}

pub async fn find_list(db: &PgPool, id: i64) -> anyhow::Result<Option<List>> {
    let row = sqlx::query_as::<_, ListRow>(&format!("{LIST_SELECT} WHERE l.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(List::from))
}

/// Inserts a new list; the creator starts out as the owner.
pub async fn create_list(
    db: &PgPool,
    kind: &str,
    version: &str,
    structure: &[Area],
    fields: &HashMap<String, bool>,
    colors: Option<&HashMap<String, String>>,
    creator_handle: &str,
) -> anyhow::Result<List> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO lists (type, version, structure, fields, colors, created_by, owned_by)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        RETURNING id
        "#,
    )
    .bind(kind)
    .bind(version)
    .bind(Json(structure))
    .bind(Json(fields))
    .bind(colors.map(Json))
    .bind(creator_handle)
    .fetch_one(db)
    .await?;

    let list = find_list(db, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("freshly created list {id} vanished"))?;
    Ok(list)
}

/// Persists the mutable columns of an engine-produced list state. The update
/// is a single-row write; per-record atomicity comes from the store.
pub async fn save_update(db: &PgPool, list: &List) -> anyhow::Result<List> {
    sqlx::query(
        r#"
        UPDATE lists
        SET fields = $2,
            responsible = $3,
            phone_number = $4,
            event_date = $5,
            comment = $6,
            submitted_at = $7,
            verified_by = $8,
            verified_at = $9,
            owned_by = $10,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(list.id)
    .bind(Json(&list.fields))
    .bind(&list.responsible)
    .bind(&list.phone_number)
    .bind(&list.event_date)
    .bind(&list.comment)
    .bind(list.submitted_at)
    .bind(list.verified.as_ref().map(|v| v.verified_by.clone()))
    .bind(list.verified.as_ref().map(|v| v.verified_at))
    .bind(&list.owned_by.handle)
    .execute(db)
    .await?;

    let saved = find_list(db, list.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("list {} vanished during update", list.id))?;
    Ok(saved)
}
