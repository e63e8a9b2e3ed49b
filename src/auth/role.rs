use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// User roles, ordered low to high privilege. Every permission comparison in
/// the system goes through [`Role::is_at_least`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum Role {
    Base,
    Manager,
    Mod,
    Admin,
}

impl Role {
    /// True iff `self` ranks at or above `minimum`.
    pub fn is_at_least(self, minimum: Role) -> bool {
        self >= minimum
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Base => "BASE",
            Role::Manager => "MANAGER",
            Role::Mod => "MOD",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASE" => Ok(Role::Base),
            "MANAGER" => Ok(Role::Manager),
            "MOD" => Ok(Role::Mod),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// The authorize half of the gate: passes the caller through unchanged when
/// their role clears the floor.
pub fn require_role(role: Role, minimum: Role) -> Result<(), ApiError> {
    if role.is_at_least(minimum) {
        return Ok(());
    }
    Err(ApiError::forbidden(
        "User is not allowed to access this content",
    ))
}
