//! In-process store backed by ordered maps behind a single `RwLock`.
//!
//! Not durable. Used for local development and by the test suite. One lock
//! guards every table, so cascading writes such as role deletion are applied
//! atomically and readers never see half of a mutation.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::model::{
    attendance::{
        Attendance, AttendanceFilter, AttendanceId, AttendanceResponse, NewAttendance, ShiftSlot,
    },
    device::{Device, DeviceId},
    permission::{Permission, PermissionEntry},
    role::{Role, RoleId},
    user::{NewUser, User, UserId},
};
use crate::models::{PageRequest, Paged};

#[derive(Default)]
struct State {
    last_role_id: RoleId,
    roles: BTreeMap<RoleId, Role>,
    last_user_id: UserId,
    users: BTreeMap<UserId, User>,
    last_device_id: DeviceId,
    devices: BTreeMap<DeviceId, Device>,
    last_attendance_id: AttendanceId,
    attendance: BTreeMap<AttendanceId, Attendance>,
}

impl State {
    fn role_mut(&mut self, id: RoleId) -> StoreResult<&mut Role> {
        self.roles
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("role", id))
    }

    fn ensure_role(&self, id: Option<RoleId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.roles.contains_key(&id) => Err(StoreError::not_found("role", id)),
            _ => Ok(()),
        }
    }

    fn open_attendance_mut(&mut self, id: AttendanceId) -> StoreResult<Option<&mut Attendance>> {
        let record = self
            .attendance
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("attendance", id))?;
        Ok((!record.is_complete()).then_some(record))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_permission_catalog(&self, _entries: &[PermissionEntry]) -> StoreResult<()> {
        Ok(())
    }

    async fn list_roles(&self, name: Option<&str>, page: PageRequest) -> StoreResult<Paged<Role>> {
        let state = self.state.read().await;
        let needle = name.map(str::to_lowercase);

        let matching = state
            .roles
            .values()
            .filter(|role| match &needle {
                Some(n) => role.name.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect();

        Ok(Paged::from_sorted(matching, page))
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn insert_role(&self, name: &str, permissions: &BTreeSet<Permission>) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        if state.roles.values().any(|r| r.name == name) {
            return Err(StoreError::Conflict(format!("role name '{name}' already exists")));
        }

        state.last_role_id += 1;
        let role = Role {
            id: state.last_role_id,
            name: name.to_string(),
            permissions: permissions.clone(),
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn rename_role(&self, id: RoleId, name: &str) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&id) {
            return Err(StoreError::not_found("role", id));
        }
        if state.roles.values().any(|r| r.id != id && r.name == name) {
            return Err(StoreError::Conflict(format!("role name '{name}' already exists")));
        }

        let role = state.role_mut(id)?;
        role.name = name.to_string();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<Option<u64>> {
        let mut state = self.state.write().await;
        if state.roles.remove(&id).is_none() {
            return Ok(None);
        }

        let mut detached = 0;
        for user in state.users.values_mut().filter(|u| u.role_id == Some(id)) {
            user.role_id = None;
            detached += 1;
        }
        Ok(Some(detached))
    }

    async fn add_role_permissions(
        &self,
        id: RoleId,
        permissions: &BTreeSet<Permission>,
    ) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        let role = state.role_mut(id)?;
        role.permissions.extend(permissions.iter().copied());
        Ok(role.clone())
    }

    async fn remove_role_permissions(
        &self,
        id: RoleId,
        permissions: &BTreeSet<Permission>,
    ) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        let role = state.role_mut(id)?;
        role.permissions.retain(|p| !permissions.contains(p));
        Ok(role.clone())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.rfid_code == user.rfid_code) {
            return Err(StoreError::Conflict(format!(
                "RFID code '{}' is already registered",
                user.rfid_code
            )));
        }
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        state.ensure_role(user.role_id)?;

        state.last_user_id += 1;
        let user = User {
            id: state.last_user_id,
            username: user.username,
            rfid_code: user.rfid_code,
            full_name: user.full_name,
            role_id: user.role_id,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_rfid(&self, rfid_code: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.rfid_code == rfid_code).cloned())
    }

    async fn set_user_role(&self, id: UserId, role_id: Option<RoleId>) -> StoreResult<User> {
        let mut state = self.state.write().await;
        state.ensure_role(role_id)?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        user.role_id = role_id;
        Ok(user.clone())
    }

    async fn list_rfid_codes(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.users.values().map(|u| u.rfid_code.clone()).collect())
    }

    async fn insert_device(&self, location: &str) -> StoreResult<Device> {
        let mut state = self.state.write().await;
        state.last_device_id += 1;
        let device = Device {
            id: state.last_device_id,
            location: location.to_string(),
        };
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get_device(&self, id: DeviceId) -> StoreResult<Option<Device>> {
        Ok(self.state.read().await.devices.get(&id).cloned())
    }

    async fn find_slot_attendance(&self, slot: &ShiftSlot) -> StoreResult<Vec<Attendance>> {
        let state = self.state.read().await;
        Ok(state
            .attendance
            .values()
            .filter(|a| a.slot() == *slot)
            .cloned()
            .collect())
    }

    async fn insert_attendance(&self, new: NewAttendance) -> StoreResult<Attendance> {
        let mut state = self.state.write().await;
        let taken = state.attendance.values().any(|a| {
            a.user_id == new.user_id
                && a.date == new.date
                && a.shift == new.shift
                && a.location == new.location
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "attendance for user {} on {} ({}) at '{}' already exists",
                new.user_id, new.date, new.shift, new.location
            )));
        }

        state.last_attendance_id += 1;
        let record = Attendance {
            id: state.last_attendance_id,
            user_id: new.user_id,
            date: new.date,
            shift: new.shift,
            location: new.location,
            time_in: new.time_in,
            time_out: None,
            on_time: new.on_time,
        };
        state.attendance.insert(record.id, record.clone());
        Ok(record)
    }

    async fn close_attendance(
        &self,
        id: AttendanceId,
        time_out: NaiveTime,
    ) -> StoreResult<Option<Attendance>> {
        let mut state = self.state.write().await;
        Ok(state.open_attendance_mut(id)?.map(|record| {
            record.time_out = Some(time_out);
            record.clone()
        }))
    }

    async fn reset_time_in(
        &self,
        id: AttendanceId,
        time_in: NaiveTime,
        on_time: bool,
    ) -> StoreResult<Option<Attendance>> {
        let mut state = self.state.write().await;
        Ok(state.open_attendance_mut(id)?.map(|record| {
            record.time_in = time_in;
            record.on_time = on_time;
            record.clone()
        }))
    }

    async fn filter_attendance(
        &self,
        filter: &AttendanceFilter,
        page: PageRequest,
    ) -> StoreResult<Paged<AttendanceResponse>> {
        let state = self.state.read().await;

        let mut rows: Vec<AttendanceResponse> = state
            .attendance
            .values()
            .filter_map(|record| {
                let user = state.users.get(&record.user_id)?;
                filter
                    .matches(record, &user.username)
                    .then(|| AttendanceResponse {
                        id: record.id,
                        rfid_code: user.rfid_code.clone(),
                        full_name: user.full_name.clone(),
                        username: user.username.clone(),
                        date: record.date,
                        shift: record.shift,
                        location: record.location.clone(),
                        time_in: record.time_in,
                        time_out: record.time_out,
                        on_time: record.on_time,
                    })
            })
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));

        Ok(Paged::from_sorted(rows, page))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shift::Shift;
    use chrono::NaiveDate;

    fn new_attendance(user_id: UserId, location: &str) -> NewAttendance {
        NewAttendance {
            user_id,
            date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
            shift: Shift::Morning,
            location: location.to_string(),
            time_in: NaiveTime::from_hms_opt(8, 1, 0).unwrap(),
            on_time: true,
        }
    }

    #[actix_web::test]
    async fn role_names_are_unique_and_case_sensitive() {
        let store = MemoryStore::new();
        store.insert_role("Technician", &BTreeSet::new()).await.expect("first");

        let err = store
            .insert_role("Technician", &BTreeSet::new())
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .insert_role("technician", &BTreeSet::new())
            .await
            .expect("different case is a different name");
    }

    #[actix_web::test]
    async fn deleting_role_detaches_users() {
        let store = MemoryStore::new();
        let role = store.insert_role("Guard", &BTreeSet::new()).await.unwrap();
        let user = store
            .insert_user(NewUser {
                username: "guard1".into(),
                rfid_code: "AA01".into(),
                full_name: "Guard One".into(),
                role_id: Some(role.id),
            })
            .await
            .unwrap();

        assert_eq!(store.delete_role(role.id).await.unwrap(), Some(1));
        assert_eq!(store.delete_role(role.id).await.unwrap(), None);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().role_id, None);
    }

    #[actix_web::test]
    async fn attendance_natural_key_is_enforced() {
        let store = MemoryStore::new();
        store.insert_attendance(new_attendance(1, "Gate A")).await.unwrap();

        let err = store
            .insert_attendance(new_attendance(1, "Gate A"))
            .await
            .expect_err("same key");
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .insert_attendance(new_attendance(1, "Gate B"))
            .await
            .expect("other location is another key");
    }

    #[actix_web::test]
    async fn close_is_conditional_on_open_record() {
        let store = MemoryStore::new();
        let record = store.insert_attendance(new_attendance(1, "Gate A")).await.unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let closed = store.close_attendance(record.id, noon).await.unwrap();
        assert_eq!(closed.unwrap().time_out, Some(noon));

        assert!(store.close_attendance(record.id, noon).await.unwrap().is_none());
        assert!(store.reset_time_in(record.id, noon, false).await.unwrap().is_none());
        assert!(matches!(
            store.close_attendance(999, noon).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
