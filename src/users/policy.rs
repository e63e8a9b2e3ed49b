//! Boundary rules for who may create and edit which users. Kept as pure
//! membership checks so the handler reads as a straight sequence of gates.

use crate::{auth::role::Role, error::ApiError};

/// A caller may edit themselves; editing anyone else requires at least MOD.
/// Returns whether the edit targets the caller's own account.
pub fn check_edit_access(
    caller_handle: &str,
    caller_role: Role,
    target_handle: &str,
) -> Result<bool, ApiError> {
    let own = caller_handle == target_handle;
    if !own && !caller_role.is_at_least(Role::Mod) {
        return Err(ApiError::forbidden("Not allowed to edit this user"));
    }
    Ok(own)
}

/// Editing another user requires strictly outranking them.
pub fn check_target_rank(own: bool, caller_role: Role, target_role: Role) -> Result<(), ApiError> {
    if !own && target_role.is_at_least(caller_role) {
        return Err(ApiError::forbidden("Not allowed to edit this user"));
    }
    Ok(())
}

/// Granting MOD or above at creation time is reserved for admins.
pub fn check_role_grant(caller_role: Role, requested: Role) -> Result<(), ApiError> {
    if requested.is_at_least(Role::Mod) && caller_role != Role::Admin {
        return Err(ApiError::forbidden(format!(
            "User must be an admin to create another user with the role {requested}"
        )));
    }
    Ok(())
}

/// Role changes: never on your own account, and grants to MOD or above are
/// admin-only. A no-op "change" to the current role always passes.
pub fn check_role_change(
    own: bool,
    caller_role: Role,
    current_role: Role,
    requested: Role,
) -> Result<(), ApiError> {
    if requested == current_role {
        return Ok(());
    }
    if own {
        return Err(ApiError::forbidden("Not allowed to change own role"));
    }
    if requested.is_at_least(Role::Mod) && caller_role != Role::Admin {
        return Err(ApiError::forbidden(format!(
            "User is not allowed to change role to {requested}"
        )));
    }
    Ok(())
}

/// Only admins may set another user's password; everyone still has to prove
/// the current credential, which the handler verifies against the caller's
/// own hash. Returns the proof for that verification.
pub fn check_password_change<'a>(
    own: bool,
    caller_role: Role,
    current_password: Option<&'a str>,
) -> Result<&'a str, ApiError> {
    if !own && !caller_role.is_at_least(Role::Admin) {
        return Err(ApiError::forbidden("Not allowed to set other user's password"));
    }
    current_password.ok_or_else(|| {
        ApiError::validation("Must provide current password to change user's password")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_users_edit_only_themselves() {
        assert_eq!(check_edit_access("anna", Role::Base, "anna").unwrap(), true);
        assert!(check_edit_access("anna", Role::Base, "bert").is_err());
        assert_eq!(check_edit_access("maja", Role::Mod, "bert").unwrap(), false);
    }

    #[test]
    fn editors_must_outrank_their_target() {
        assert!(check_target_rank(false, Role::Mod, Role::Base).is_ok());
        assert!(check_target_rank(false, Role::Mod, Role::Mod).is_err());
        assert!(check_target_rank(false, Role::Mod, Role::Admin).is_err());
        // Own edits are exempt from the rank rule.
        assert!(check_target_rank(true, Role::Base, Role::Base).is_ok());
    }

    #[test]
    fn only_admins_grant_mod_or_above() {
        assert!(check_role_grant(Role::Mod, Role::Manager).is_ok());
        assert!(check_role_grant(Role::Mod, Role::Mod).is_err());
        assert!(check_role_grant(Role::Admin, Role::Admin).is_ok());
    }

    #[test]
    fn role_changes_never_apply_to_own_account() {
        assert!(check_role_change(true, Role::Admin, Role::Admin, Role::Base).is_err());
        assert!(check_role_change(true, Role::Admin, Role::Admin, Role::Admin).is_ok());
        assert!(check_role_change(false, Role::Admin, Role::Base, Role::Mod).is_ok());
        assert!(check_role_change(false, Role::Mod, Role::Base, Role::Mod).is_err());
        assert!(check_role_change(false, Role::Mod, Role::Base, Role::Manager).is_ok());
    }

    #[test]
    fn password_changes_require_proof_and_rank() {
        assert!(check_password_change(true, Role::Base, Some("pw")).is_ok());
        assert!(check_password_change(true, Role::Base, None).is_err());
        assert!(check_password_change(false, Role::Mod, Some("pw")).is_err());
        assert!(check_password_change(false, Role::Admin, Some("pw")).is_ok());
    }
}
