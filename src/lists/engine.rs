//! List lifecycle engine: every mutation to a list passes through the gates
//! here before anything is persisted. The functions are pure over the loaded
//! list state, the caller, and the patch; the PATCH handler composes them in
//! order (ownership gate, owner reassignment, verification, submission
//! completeness) and then applies the update.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    auth::role::Role,
    error::ApiError,
    lists::{
        dto::{Area, UpdateList},
        repo::{List, Verification},
    },
    users::repo::MinimalUser,
};

/// Derived from the submission timestamp and verification record; never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    Open,
    Submitted,
    Verified,
}

pub fn status(submitted_at: Option<OffsetDateTime>, verified: bool) -> ListStatus {
    if verified {
        ListStatus::Verified
    } else if submitted_at.is_some() {
        ListStatus::Submitted
    } else {
        ListStatus::Open
    }
}

/// Derives the initial completion map for a structure: one `false` entry per
/// check item, keyed by "areaIndex.categoryIndex.checkIndex".
pub fn initial_fields(structure: &[Area]) -> HashMap<String, bool> {
    let mut fields = HashMap::new();
    for (area_index, area) in structure.iter().enumerate() {
        for (category_index, category) in area.categories.iter().enumerate() {
            for check_index in 0..category.checks.len() {
                fields.insert(
                    format!("{area_index}.{category_index}.{check_index}"),
                    false,
                );
            }
        }
    }
    fields
}

impl UpdateList {
    /// The static set of properties requiring ownership or MOD privileges.
    /// `verified` is deliberately absent: verification has its own gate.
    pub fn touches_gated_field(&self) -> bool {
        self.fields.is_some()
            || self.responsible.is_some()
            || self.phone_number.is_some()
            || self.event_date.is_some()
            || self.comment.is_some()
            || self.submitted.is_some()
            || self.owner.is_some()
    }
}

/// Gate: ownership-gated properties may only be changed by the current owner
/// or a caller of at least MOD.
pub fn authorize_edit(caller: &MinimalUser, list: &List, patch: &UpdateList) -> Result<(), ApiError> {
    if caller.handle != list.owned_by.handle
        && !caller.role.is_at_least(Role::Mod)
        && patch.touches_gated_field()
    {
        return Err(ApiError::forbidden(
            "Must be owner of the list or a moderator to change those properties",
        ));
    }
    Ok(())
}

/// Gate: ownership is frozen once a list is submitted.
pub fn check_owner_change(list: &List, patch: &UpdateList) -> Result<(), ApiError> {
    if patch.owner.is_some() && list.submitted_at.is_some() {
        return Err(ApiError::conflict(
            "It's not possible to change owner of a submitted list",
        ));
    }
    Ok(())
}

/// Gate: verification requires a submitted list, and a verifier of at least
/// MOD — or a MANAGER who does not own the list. A MANAGER never verifies
/// their own list.
pub fn check_verification(
    caller: &MinimalUser,
    list: &List,
    patch: &UpdateList,
) -> Result<(), ApiError> {
    if patch.verified == Some(true) && list.submitted_at.is_none() {
        return Err(ApiError::conflict(
            "It's not possible to verify a list that isn't submitted",
        ));
    }
    if patch.verified.is_some() {
        let allowed = caller.role.is_at_least(Role::Mod)
            || (caller.role == Role::Manager && caller.handle != list.owned_by.handle);
        if !allowed {
            return Err(ApiError::forbidden("User is not allowed to verify this list"));
        }
    }
    Ok(())
}

/// Gate: a submission requires event date, phone number, and responsible to
/// be present after this same update is applied.
pub fn check_submission(list: &List, patch: &UpdateList) -> Result<(), ApiError> {
    if patch.submitted != Some(true) {
        return Ok(());
    }
    let filled = |patched: Option<&String>, existing: Option<&String>| {
        patched.or(existing).is_some_and(|value| !value.is_empty())
    };
    let complete = filled(patch.event_date.as_ref(), list.event_date.as_ref())
        && filled(patch.phone_number.as_ref(), list.phone_number.as_ref())
        && filled(patch.responsible.as_ref(), list.responsible.as_ref());
    if !complete {
        return Err(ApiError::conflict(
            "Can't submit a list that is missing required properties",
        ));
    }
    Ok(())
}

/// Applies a gate-approved patch, producing the new list state:
/// - `fields` is merged onto the existing map, untouched keys survive;
/// - `submitted: true` stamps `submitted_at` only on the open→submitted
///   transition, `false` clears it;
/// - `verified: true` records the caller as verifier, `false` removes the
///   record; the flags stay independent (no cascade either way);
/// - a submission by a non-owner transfers ownership to the submitting
///   caller.
pub fn apply_update(
    list: &List,
    patch: UpdateList,
    caller: &MinimalUser,
    new_owner: Option<MinimalUser>,
    now: OffsetDateTime,
) -> List {
    let mut next = list.clone();

    if let Some(patch_fields) = patch.fields {
        next.fields.extend(patch_fields);
    }
    if let Some(responsible) = patch.responsible {
        next.responsible = Some(responsible);
    }
    if let Some(phone_number) = patch.phone_number {
        next.phone_number = Some(phone_number);
    }
    if let Some(event_date) = patch.event_date {
        next.event_date = Some(event_date);
    }
    if let Some(comment) = patch.comment {
        next.comment = comment;
    }

    match patch.submitted {
        Some(true) if next.submitted_at.is_none() => next.submitted_at = Some(now),
        Some(false) => next.submitted_at = None,
        _ => {}
    }
    match patch.verified {
        Some(true) => {
            next.verified = Some(Verification {
                verified_by: caller.handle.clone(),
                verified_at: now,
            });
        }
        Some(false) => next.verified = None,
        None => {}
    }

    if let Some(owner) = new_owner {
        next.owned_by = owner;
    }
    // A submission always transfers ownership to whoever submits.
    if patch.submitted == Some(true) && list.owned_by.handle != caller.handle {
        next.owned_by = caller.clone();
    }

    next.updated_at = now;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lists::dto::Category;

    fn user(handle: &str, role: Role) -> MinimalUser {
        MinimalUser {
            handle: handle.to_string(),
            name: handle.to_string(),
            role,
        }
    }

    fn open_list(owner: &MinimalUser) -> List {
        List {
            id: 1,
            kind: "cleaning".to_string(),
            version: "v2".to_string(),
            structure: vec![Area {
                name: "Kitchen".to_string(),
                comment: None,
                categories: vec![Category {
                    name: "Counters".to_string(),
                    checks: vec!["wipe".to_string(), "sanitize".to_string()],
                }],
            }],
            fields: HashMap::from([("0.0.0".to_string(), false), ("0.0.1".to_string(), false)]),
            colors: None,
            responsible: Some("Anna".to_string()),
            phone_number: Some("0701234567".to_string()),
            event_date: Some("2024-03-01".to_string()),
            comment: None,
            submitted_at: None,
            verified: None,
            created_by: owner.clone(),
            owned_by: owner.clone(),
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn submitted_list(owner: &MinimalUser) -> List {
        let mut list = open_list(owner);
        list.submitted_at = Some(OffsetDateTime::UNIX_EPOCH);
        list
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[test]
    fn initial_fields_covers_every_check_position() {
        let structure = vec![Area {
            name: "Kitchen".to_string(),
            comment: None,
            categories: vec![Category {
                name: "Counters".to_string(),
                checks: vec!["wipe".to_string(), "sanitize".to_string()],
            }],
        }];
        let fields = initial_fields(&structure);
        assert_eq!(
            fields,
            HashMap::from([("0.0.0".to_string(), false), ("0.0.1".to_string(), false)])
        );
    }

    #[test]
    fn status_is_derived_from_submission_and_verification() {
        assert_eq!(status(None, false), ListStatus::Open);
        assert_eq!(status(Some(now()), false), ListStatus::Submitted);
        assert_eq!(status(Some(now()), true), ListStatus::Verified);
    }

    #[test]
    fn non_owner_base_cannot_touch_gated_fields() {
        let owner = user("anna", Role::Base);
        let outsider = user("bert", Role::Base);
        let list = open_list(&owner);
        let patch = UpdateList {
            responsible: Some("Bert".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            authorize_edit(&outsider, &list, &patch),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn owner_and_mod_pass_the_ownership_gate() {
        let owner = user("anna", Role::Base);
        let moderator = user("maja", Role::Mod);
        let list = open_list(&owner);
        let patch = UpdateList {
            fields: Some(HashMap::from([("0.0.0".to_string(), true)])),
            ..Default::default()
        };
        assert!(authorize_edit(&owner, &list, &patch).is_ok());
        assert!(authorize_edit(&moderator, &list, &patch).is_ok());
    }

    #[test]
    fn verified_only_patch_skips_the_ownership_gate() {
        let owner = user("anna", Role::Base);
        let manager = user("moa", Role::Manager);
        let list = submitted_list(&owner);
        let patch = UpdateList {
            verified: Some(true),
            ..Default::default()
        };
        assert!(authorize_edit(&manager, &list, &patch).is_ok());
        assert!(check_verification(&manager, &list, &patch).is_ok());
    }

    #[test]
    fn owner_change_is_frozen_after_submission() {
        let owner = user("anna", Role::Base);
        let patch = UpdateList {
            owner: Some("bert".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            check_owner_change(&submitted_list(&owner), &patch),
            Err(ApiError::Conflict(_))
        ));
        assert!(check_owner_change(&open_list(&owner), &patch).is_ok());
    }

    #[test]
    fn verifying_an_unsubmitted_list_conflicts_for_any_role() {
        let owner = user("anna", Role::Base);
        let list = open_list(&owner);
        let patch = UpdateList {
            verified: Some(true),
            ..Default::default()
        };
        for role in [Role::Base, Role::Manager, Role::Mod, Role::Admin] {
            let caller = user("vera", role);
            assert!(matches!(
                check_verification(&caller, &list, &patch),
                Err(ApiError::Conflict(_))
            ));
        }
    }

    #[test]
    fn manager_never_verifies_their_own_list() {
        let manager = user("moa", Role::Manager);
        let list = submitted_list(&manager);
        let patch = UpdateList {
            verified: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            check_verification(&manager, &list, &patch),
            Err(ApiError::Forbidden(_))
        ));
        // A moderator may verify their own list.
        let moderator = user("maja", Role::Mod);
        let own = submitted_list(&moderator);
        assert!(check_verification(&moderator, &own, &patch).is_ok());
    }

    #[test]
    fn base_role_cannot_verify_at_all() {
        let owner = user("anna", Role::Base);
        let caller = user("bert", Role::Base);
        let list = submitted_list(&owner);
        let patch = UpdateList {
            verified: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            check_verification(&caller, &list, &patch),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn submission_requires_contact_and_date_metadata() {
        let owner = user("anna", Role::Base);
        let mut list = open_list(&owner);
        list.phone_number = None;
        let patch = UpdateList {
            submitted: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            check_submission(&list, &patch),
            Err(ApiError::Conflict(_))
        ));

        // Supplying the missing value in the same patch satisfies the gate.
        let patch = UpdateList {
            submitted: Some(true),
            phone_number: Some("0701234567".to_string()),
            ..Default::default()
        };
        assert!(check_submission(&list, &patch).is_ok());
    }

    #[test]
    fn submission_rejects_empty_strings_as_missing() {
        let owner = user("anna", Role::Base);
        let mut list = open_list(&owner);
        list.responsible = Some(String::new());
        let patch = UpdateList {
            submitted: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            check_submission(&list, &patch),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn field_merge_leaves_unmentioned_keys_untouched() {
        let owner = user("anna", Role::Base);
        let list = open_list(&owner);
        let patch = UpdateList {
            fields: Some(HashMap::from([("0.0.1".to_string(), true)])),
            ..Default::default()
        };
        let next = apply_update(&list, patch, &owner, None, now());
        assert_eq!(next.fields["0.0.0"], false);
        assert_eq!(next.fields["0.0.1"], true);
    }

    #[test]
    fn submitting_stamps_submitted_at_and_unsubmitting_clears_it() {
        let owner = user("anna", Role::Base);
        let list = open_list(&owner);
        let at = now();
        let submitted = apply_update(
            &list,
            UpdateList {
                submitted: Some(true),
                ..Default::default()
            },
            &owner,
            None,
            at,
        );
        assert_eq!(submitted.submitted_at, Some(at));

        let reopened = apply_update(
            &submitted,
            UpdateList {
                submitted: Some(false),
                ..Default::default()
            },
            &owner,
            None,
            now(),
        );
        assert_eq!(reopened.submitted_at, None);
    }

    #[test]
    fn resubmitting_keeps_the_original_submission_timestamp() {
        let owner = user("anna", Role::Base);
        let list = submitted_list(&owner);
        let next = apply_update(
            &list,
            UpdateList {
                submitted: Some(true),
                ..Default::default()
            },
            &owner,
            None,
            now(),
        );
        assert_eq!(next.submitted_at, Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn verification_records_the_caller_and_clears_on_false() {
        let owner = user("anna", Role::Base);
        let moderator = user("maja", Role::Mod);
        let list = submitted_list(&owner);
        let at = now();
        let verified = apply_update(
            &list,
            UpdateList {
                verified: Some(true),
                ..Default::default()
            },
            &moderator,
            None,
            at,
        );
        assert_eq!(
            verified.verified,
            Some(Verification {
                verified_by: "maja".to_string(),
                verified_at: at,
            })
        );

        let cleared = apply_update(
            &verified,
            UpdateList {
                verified: Some(false),
                ..Default::default()
            },
            &moderator,
            None,
            now(),
        );
        assert_eq!(cleared.verified, None);
    }

    // The source behavior for un-submitting a verified list is ambiguous;
    // the flags are kept independent rather than cascading.
    #[test]
    fn unsubmitting_does_not_cascade_clear_verification() {
        let owner = user("anna", Role::Base);
        let moderator = user("maja", Role::Mod);
        let mut list = submitted_list(&owner);
        list.verified = Some(Verification {
            verified_by: "maja".to_string(),
            verified_at: OffsetDateTime::UNIX_EPOCH,
        });
        let next = apply_update(
            &list,
            UpdateList {
                submitted: Some(false),
                ..Default::default()
            },
            &moderator,
            None,
            now(),
        );
        assert_eq!(next.submitted_at, None);
        assert!(next.verified.is_some());
    }

    #[test]
    fn submitting_as_non_owner_transfers_ownership_to_the_caller() {
        let owner = user("anna", Role::Base);
        let moderator = user("maja", Role::Mod);
        let list = open_list(&owner);
        let next = apply_update(
            &list,
            UpdateList {
                submitted: Some(true),
                ..Default::default()
            },
            &moderator,
            None,
            now(),
        );
        assert_eq!(next.owned_by.handle, "maja");
    }

    #[test]
    fn submitting_as_owner_keeps_ownership() {
        let owner = user("anna", Role::Base);
        let list = open_list(&owner);
        let next = apply_update(
            &list,
            UpdateList {
                submitted: Some(true),
                ..Default::default()
            },
            &owner,
            None,
            now(),
        );
        assert_eq!(next.owned_by.handle, "anna");
    }

    #[test]
    fn explicit_owner_reassignment_applies() {
        let owner = user("anna", Role::Base);
        let moderator = user("maja", Role::Mod);
        let target = user("bert", Role::Base);
        let list = open_list(&owner);
        let next = apply_update(
            &list,
            UpdateList {
                owner: Some("bert".to_string()),
                ..Default::default()
            },
            &moderator,
            Some(target),
            now(),
        );
        assert_eq!(next.owned_by.handle, "bert");
        // createdBy is permanent.
        assert_eq!(next.created_by.handle, "anna");
    }

    #[test]
    fn comment_can_be_cleared_with_explicit_null() {
        let owner = user("anna", Role::Base);
        let mut list = open_list(&owner);
        list.comment = Some("old note".to_string());
        let next = apply_update(
            &list,
            UpdateList {
                comment: Some(None),
                ..Default::default()
            },
            &owner,
            None,
            now(),
        );
        assert_eq!(next.comment, None);
    }
}
