use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveTime;
use thiserror::Error;

use crate::model::{
    attendance::{Attendance, AttendanceFilter, AttendanceId, AttendanceResponse, NewAttendance, ShiftSlot},
    device::{Device, DeviceId},
    permission::{Permission, PermissionEntry},
    role::{Role, RoleId},
    user::{NewUser, User, UserId},
};
use crate::models::{PageRequest, Paged};

pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for roles, users, devices and attendance.
///
/// Each method is atomic on its own: role reads return name and permissions
/// from the same snapshot, and role mutations are applied in full or not at
/// all. Attendance writes are conditional so racing callers can detect that
/// the state they read has moved on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ensure_permission_catalog(&self, entries: &[PermissionEntry]) -> StoreResult<()>;

    async fn list_roles(&self, name: Option<&str>, page: PageRequest) -> StoreResult<Paged<Role>>;
    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    /// Fails with `Conflict` when the exact name is taken.
    async fn insert_role(&self, name: &str, permissions: &BTreeSet<Permission>) -> StoreResult<Role>;
    async fn rename_role(&self, id: RoleId, name: &str) -> StoreResult<Role>;
    /// Removes the role and clears it from every user holding it. Returns the
    /// number of detached users, or `None` when the role did not exist.
    async fn delete_role(&self, id: RoleId) -> StoreResult<Option<u64>>;
    async fn add_role_permissions(
        &self,
        id: RoleId,
        permissions: &BTreeSet<Permission>,
    ) -> StoreResult<Role>;
    async fn remove_role_permissions(
        &self,
        id: RoleId,
        permissions: &BTreeSet<Permission>,
    ) -> StoreResult<Role>;

    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn find_user_by_rfid(&self, rfid_code: &str) -> StoreResult<Option<User>>;
    async fn set_user_role(&self, id: UserId, role_id: Option<RoleId>) -> StoreResult<User>;
    async fn list_rfid_codes(&self) -> StoreResult<Vec<String>>;

    async fn insert_device(&self, location: &str) -> StoreResult<Device>;
    async fn get_device(&self, id: DeviceId) -> StoreResult<Option<Device>>;

    /// Every record of the slot, whatever the location, ordered by id.
    async fn find_slot_attendance(&self, slot: &ShiftSlot) -> StoreResult<Vec<Attendance>>;
    /// Fails with `Conflict` when (user, date, shift, location) already exists.
    async fn insert_attendance(&self, attendance: NewAttendance) -> StoreResult<Attendance>;
    /// Sets `time_out` only if it is still empty; `None` means another scan got
    /// there first.
    async fn close_attendance(
        &self,
        id: AttendanceId,
        time_out: NaiveTime,
    ) -> StoreResult<Option<Attendance>>;
    /// Replaces `time_in` of a record that is still open.
    async fn reset_time_in(
        &self,
        id: AttendanceId,
        time_in: NaiveTime,
        on_time: bool,
    ) -> StoreResult<Option<Attendance>>;
    /// Ordered by date descending, then id ascending.
    async fn filter_attendance(
        &self,
        filter: &AttendanceFilter,
        page: PageRequest,
    ) -> StoreResult<Paged<AttendanceResponse>>;

    fn backend_name(&self) -> &'static str;

    /// Whether other processes may write to the same data. A shared store can
    /// gain users this process never saw.
    fn is_shared(&self) -> bool {
        false
    }
}
