use std::collections::BTreeSet;

use serde::Serialize;
use utoipa::ToSchema;

use super::permission::{Permission, PermissionEntry};

pub type RoleId = u32;

/// Name of the role that passes role-literal checks.
pub const ADMIN_ROLE: &str = "ADMIN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleSummary {
    #[schema(example = 3)]
    pub id: RoleId,
    #[schema(example = "Technician")]
    pub name: String,
}

impl From<Role> for RoleSummary {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    #[schema(example = 3)]
    pub id: RoleId,
    #[schema(example = "Technician")]
    pub name: String,
    pub permissions: Vec<PermissionEntry>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            permissions: role.permissions.into_iter().map(PermissionEntry::from).collect(),
        }
    }
}
