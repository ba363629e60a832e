use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::permission::{Permission, PermissionCatalog};
use crate::model::role::{ADMIN_ROLE, Role, RoleId};
use crate::models::{PageRequest, Paged};
use crate::store::{Store, StoreError};

const MAX_ROLE_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteStatus {
    Deleted,
    NotFound,
    /// The ADMIN role is never deleted
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeleteOutcome {
    #[schema(example = 4)]
    pub id: RoleId,
    pub status: DeleteStatus,
    /// Users whose role reference was cleared by the deletion
    #[schema(example = 2)]
    pub detached_users: u64,
}

/// Per-id result of a bulk delete. A missing id never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeleteReport {
    pub outcomes: Vec<DeleteOutcome>,
}

impl DeleteReport {
    pub fn deleted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeleteStatus::Deleted)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.deleted() == self.outcomes.len()
    }
}

/// Role and role-permission administration.
pub struct RoleService {
    store: Arc<dyn Store>,
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Role name must not be blank".into()));
    }
    if name.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Role name must be at most {MAX_ROLE_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

/// ADMIN is matched by name when gating permission assignment, so no other
/// role may take that name and ADMIN itself may not be renamed.
fn ensure_not_reserved(name: &str) -> AppResult<()> {
    if name.eq_ignore_ascii_case(ADMIN_ROLE) {
        return Err(AppError::Conflict(format!("Role name {ADMIN_ROLE} is reserved")));
    }
    Ok(())
}

fn resolve_permissions(ids: &[u32]) -> AppResult<BTreeSet<Permission>> {
    PermissionCatalog::global().resolve(ids).map_err(|missing| {
        let ids = missing
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        AppError::not_found("permission", ids)
    })
}

impl RoleService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_roles(&self, name: Option<&str>, page: PageRequest) -> AppResult<Paged<Role>> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        Ok(self.store.list_roles(name, page).await?)
    }

    pub async fn get_role(&self, id: RoleId) -> AppResult<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| AppError::not_found("role", id))
    }

    pub async fn create_role(&self, name: &str, permission_ids: &[u32]) -> AppResult<Role> {
        let name = validate_name(name)?;
        ensure_not_reserved(name)?;
        let permissions = resolve_permissions(permission_ids)?;

        let role = self.store.insert_role(name, &permissions).await?;
        info!(role_id = role.id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn update_role(&self, id: RoleId, name: &str) -> AppResult<Role> {
        let name = validate_name(name)?;
        let current = self.get_role(id).await?;
        if current.name == ADMIN_ROLE {
            return Err(AppError::Conflict(format!("Role {ADMIN_ROLE} cannot be renamed")));
        }
        ensure_not_reserved(name)?;

        let role = self.store.rename_role(id, name).await?;
        info!(role_id = id, name = %role.name, "Role renamed");
        Ok(role)
    }

    pub async fn delete_roles(&self, ids: &[RoleId]) -> AppResult<DeleteReport> {
        let mut seen = BTreeSet::new();
        let mut outcomes = Vec::with_capacity(ids.len());

        for id in ids.iter().copied().filter(|id| seen.insert(*id)) {
            let protected = matches!(
                self.store.get_role(id).await?,
                Some(role) if role.name == ADMIN_ROLE
            );
            if protected {
                warn!(role_id = id, "Refusing to delete the ADMIN role");
                outcomes.push(DeleteOutcome {
                    id,
                    status: DeleteStatus::Protected,
                    detached_users: 0,
                });
                continue;
            }

            let outcome = match self.store.delete_role(id).await? {
                Some(detached_users) => {
                    info!(role_id = id, detached_users, "Role deleted");
                    DeleteOutcome {
                        id,
                        status: DeleteStatus::Deleted,
                        detached_users,
                    }
                }
                None => {
                    debug!(role_id = id, "Role to delete not found");
                    DeleteOutcome {
                        id,
                        status: DeleteStatus::NotFound,
                        detached_users: 0,
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(DeleteReport { outcomes })
    }

    /// Union with the current set. Unknown ids reject the whole call.
    pub async fn assign_permissions(&self, role_id: RoleId, permission_ids: &[u32]) -> AppResult<Role> {
        let permissions = resolve_permissions(permission_ids)?;
        let role = self.store.add_role_permissions(role_id, &permissions).await?;
        info!(role_id, assigned = ?permissions, "Permissions assigned");
        Ok(role)
    }

    /// Set difference with the current set. Ids not currently held are no-ops.
    pub async fn unassign_permissions(&self, role_id: RoleId, permission_ids: &[u32]) -> AppResult<Role> {
        let permissions = resolve_permissions(permission_ids)?;
        let role = self.store.remove_role_permissions(role_id, &permissions).await?;
        info!(role_id, unassigned = ?permissions, "Permissions unassigned");
        Ok(role)
    }

    /// Makes sure the ADMIN role exists and holds the whole catalog.
    pub async fn ensure_admin_role(&self) -> AppResult<Role> {
        let all = PermissionCatalog::global().all();

        if let Some(admin) = self.store.find_role_by_name(ADMIN_ROLE).await? {
            return Ok(self.store.add_role_permissions(admin.id, &all).await?);
        }

        match self.store.insert_role(ADMIN_ROLE, &all).await {
            Ok(role) => {
                info!(role_id = role.id, "ADMIN role bootstrapped");
                Ok(role)
            }
            // created concurrently by another instance
            Err(StoreError::Conflict(_)) => self
                .store
                .find_role_by_name(ADMIN_ROLE)
                .await?
                .ok_or_else(|| AppError::Internal("ADMIN role vanished during bootstrap".into())),
            Err(e) => Err(e.into()),
        }
    }
}
