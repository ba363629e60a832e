//! Access decisions.
//!
//! A decision is a pure function of the principal's role and the capability a
//! request needs. Handlers evaluate it before touching any resource, so a
//! denial looks the same whether or not the target exists.

use derive_more::Display;

use crate::model::permission::Permission;
use crate::model::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Requirement {
    /// Allowed iff the role carries the permission.
    #[display(fmt = "permission {}", _0)]
    Permission(Permission),
    /// Allowed iff the role's name equals the literal. Bypasses the
    /// permission table.
    #[display(fmt = "role {}", _0)]
    RoleNamed(&'static str),
}

impl From<Permission> for Requirement {
    fn from(permission: Permission) -> Self {
        Requirement::Permission(permission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// A principal without a role fails every check.
pub fn decide(role: Option<&Role>, requirement: Requirement) -> Decision {
    let Some(role) = role else {
        return Decision::Deny;
    };

    let allowed = match requirement {
        Requirement::Permission(permission) => role.has_permission(permission),
        Requirement::RoleNamed(name) => role.name == name,
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}
