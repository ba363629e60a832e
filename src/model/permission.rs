use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use utoipa::ToSchema;

/// Named capabilities an administrative principal can hold.
///
/// Discriminants are the stable catalog ids exposed over the API and stored in
/// `role_permissions.permission_id`. Never renumber an existing variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    GetAllRoles = 1,
    GetRole = 2,
    CreateRole = 3,
    UpdateRole = 4,
    DeleteRoles = 5,
    AssignPermissionToRole = 6,
    UnassignPermissionFromRole = 7,
    GetAllPermissions = 8,
    FilterAttendance = 9,
    CreateUser = 10,
    AssignRoleToUser = 11,
    CreateDevice = 12,
}

impl Permission {
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        PermissionCatalog::global().get(id)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionEntry {
    #[schema(example = 2)]
    pub id: u32,
    #[schema(example = "GET_ROLE")]
    pub name: String,
}

impl From<Permission> for PermissionEntry {
    fn from(permission: Permission) -> Self {
        Self {
            id: permission.id(),
            name: permission.name().to_string(),
        }
    }
}

/// Read-only table of every permission the service knows about.
pub struct PermissionCatalog {
    entries: Vec<PermissionEntry>,
    by_id: HashMap<u32, Permission>,
}

static CATALOG: Lazy<PermissionCatalog> = Lazy::new(PermissionCatalog::load);

impl PermissionCatalog {
    fn load() -> Self {
        let by_id: HashMap<u32, Permission> = Permission::iter().map(|p| (p.id(), p)).collect();
        let entries = Permission::iter().map(PermissionEntry::from).collect();
        Self { entries, by_id }
    }

    pub fn global() -> &'static PermissionCatalog {
        &CATALOG
    }

    pub fn get(&self, id: u32) -> Option<Permission> {
        self.by_id.get(&id).copied()
    }

    pub fn entries(&self) -> &[PermissionEntry] {
        &self.entries
    }

    pub fn all(&self) -> BTreeSet<Permission> {
        self.by_id.values().copied().collect()
    }

    /// Maps catalog ids to permissions. Fails with every unknown id when at
    /// least one is missing, so callers can reject the whole request.
    pub fn resolve(&self, ids: &[u32]) -> Result<BTreeSet<Permission>, Vec<u32>> {
        let mut resolved = BTreeSet::new();
        let mut missing = Vec::new();

        for id in ids {
            match self.get(*id) {
                Some(p) => {
                    resolved.insert(p);
                }
                None if !missing.contains(id) => missing.push(*id),
                None => {}
            }
        }

        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(missing)
        }
    }
}
