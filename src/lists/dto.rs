use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::{
    error::ApiError,
    lists::{
        engine::{self, ListStatus},
        repo::List,
    },
    users::repo::MinimalUser,
    validate,
};

/// Immutable template of areas, categories, and check items defining what a
/// list tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub checks: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateList {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub structure: Vec<Area>,
    #[serde(default)]
    pub colors: Option<HashMap<String, String>>,
}

/// Partial update; absent fields stay untouched. `comment` distinguishes
/// absent from explicit null (clearing).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateList {
    #[serde(default)]
    pub fields: Option<HashMap<String, bool>>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub comment: Option<Option<String>>,
    #[serde(default)]
    pub submitted: Option<bool>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub owner: Option<String>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateList {
    /// Checks formats only; the lifecycle gates live in `lists::engine`.
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(phone) = &self.phone_number {
            if !validate::is_valid_phone_number(phone) {
                return Err(ApiError::validation("Provided properties cannot edit a list"));
            }
        }
        if let Some(date) = &self.event_date {
            let parsed = validate::parse_event_date(date)
                .ok_or_else(|| ApiError::validation("Provided properties cannot edit a list"))?;
            if validate::is_future_date(parsed) {
                return Err(ApiError::validation("Event date cannot be in the future"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDto {
    pub verified_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
}

/// Full list as returned by GET /lists/:id, POST /lists, and PATCH /lists/:id.
/// Status is recomputed from the submission/verification columns on every
/// read, never stored.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub structure: Vec<Area>,
    pub fields: HashMap<String, bool>,
    pub colors: Option<HashMap<String, String>>,
    pub responsible: Option<String>,
    pub phone_number: Option<String>,
    pub event_date: Option<String>,
    pub comment: Option<String>,
    pub status: ListStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    pub verified: Option<VerificationDto>,
    pub created_by: MinimalUser,
    pub owned_by: MinimalUser,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<List> for ListResponse {
    fn from(list: List) -> Self {
        let status = engine::status(list.submitted_at, list.verified.is_some());
        ListResponse {
            id: list.id,
            kind: list.kind,
            version: list.version,
            structure: list.structure,
            fields: list.fields,
            colors: list.colors,
            responsible: list.responsible,
            phone_number: list.phone_number,
            event_date: list.event_date,
            comment: list.comment,
            status,
            submitted_at: list.submitted_at,
            verified: list.verified.map(|v| VerificationDto {
                verified_by: v.verified_by,
                verified_at: v.verified_at,
            }),
            created_by: list.created_by,
            owned_by: list.owned_by,
            updated_at: list.updated_at,
        }
    }
}

/// Minimal summary for GET /lists.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub event_date: Option<String>,
    pub status: ListStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    pub verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_distinguishes_absent_comment_from_null() {
        let absent: UpdateList = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.comment, None);

        let cleared: UpdateList = serde_json::from_str(r#"{"comment": null}"#).unwrap();
        assert_eq!(cleared.comment, Some(None));

        let set: UpdateList = serde_json::from_str(r#"{"comment": "wiped down"}"#).unwrap();
        assert_eq!(set.comment, Some(Some("wiped down".to_string())));
    }

    #[test]
    fn update_rejects_future_event_date() {
        let patch = UpdateList {
            event_date: Some("2999-01-01".to_string()),
            ..Default::default()
        };
        assert!(matches!(patch.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn update_rejects_malformed_phone_and_date() {
        let patch = UpdateList {
            phone_number: Some("call me maybe".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let patch = UpdateList {
            event_date: Some("01/02/2024".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    // Structure content is free-form; an empty template is a legal list that
    // simply has nothing to check off.
    #[test]
    fn create_list_accepts_empty_structure_and_checks() {
        let body = r#"{"type": "cleaning", "version": "v2", "structure": []}"#;
        let props: CreateList = serde_json::from_str(body).unwrap();
        assert!(crate::lists::engine::initial_fields(&props.structure).is_empty());

        let body = r#"{
            "type": "cleaning",
            "version": "v2",
            "structure": [{"name": "", "categories": [{"name": "", "checks": []}]}]
        }"#;
        let props: CreateList = serde_json::from_str(body).unwrap();
        assert!(crate::lists::engine::initial_fields(&props.structure).is_empty());
    }

    #[test]
    fn create_list_accepts_type_key() {
        let body = r#"{
            "type": "cleaning",
            "version": "v2",
            "structure": [{"name": "Kitchen", "categories": [{"name": "Counters", "checks": ["wipe"]}]}]
        }"#;
        let props: CreateList = serde_json::from_str(body).unwrap();
        assert_eq!(props.kind, "cleaning");
        assert_eq!(props.structure[0].categories[0].checks.len(), 1);
    }
}
