use std::sync::Arc;

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::device::Device;
use crate::model::role::RoleId;
use crate::model::user::{NewUser, User, UserId};
use crate::store::Store;
use crate::utils::rfid_filter::RfidFilter;

/// Registration of card holders and scanning devices.
pub struct DirectoryService {
    store: Arc<dyn Store>,
    rfid_filter: Arc<RfidFilter>,
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be blank")));
    }
    Ok(value.to_string())
}

impl DirectoryService {
    pub fn new(store: Arc<dyn Store>, rfid_filter: Arc<RfidFilter>) -> Self {
        Self { store, rfid_filter }
    }

    pub async fn register_user(
        &self,
        username: &str,
        rfid_code: &str,
        full_name: &str,
        role_id: Option<RoleId>,
    ) -> AppResult<User> {
        let user = NewUser {
            username: required("username", username)?,
            rfid_code: required("rfid_code", rfid_code)?,
            full_name: required("full_name", full_name)?,
            role_id,
        };

        let user = self.store.insert_user(user).await?;
        self.rfid_filter.insert(&user.rfid_code);
        info!(user_id = user.id, role_id = ?user.role_id, "User registered");
        Ok(user)
    }

    /// `None` clears the user's role.
    pub async fn assign_user_role(&self, user_id: UserId, role_id: Option<RoleId>) -> AppResult<User> {
        let user = self.store.set_user_role(user_id, role_id).await?;
        info!(user_id, role_id = ?role_id, "User role changed");
        Ok(user)
    }

    pub async fn register_device(&self, location: &str) -> AppResult<Device> {
        let location = required("location", location)?;
        let device = self.store.insert_device(&location).await?;
        info!(device_id = device.id, location = %device.location, "Device registered");
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::collections::BTreeSet;

    fn service() -> (DirectoryService, Arc<MemoryStore>, Arc<RfidFilter>) {
        let store = Arc::new(MemoryStore::new());
        let filter = Arc::new(RfidFilter::default());
        (
            DirectoryService::new(store.clone(), filter.clone()),
            store,
            filter,
        )
    }

    #[actix_web::test]
    async fn registering_a_user_feeds_the_rfid_filter() {
        let (directory, _, filter) = service();
        let user = directory
            .register_user("jdoe", " 04A1B2C3 ", "John Doe", None)
            .await
            .unwrap();

        assert_eq!(user.rfid_code, "04A1B2C3");
        assert!(filter.might_contain("04A1B2C3"));
    }

    #[actix_web::test]
    async fn rejects_blank_fields_and_duplicates() {
        let (directory, _, _) = service();

        assert!(matches!(
            directory.register_user("", "RF", "Name", None).await,
            Err(AppError::Validation(_))
        ));

        directory.register_user("a", "RF-1", "A", None).await.unwrap();
        assert!(matches!(
            directory.register_user("b", "RF-1", "B", None).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            directory.register_user("a", "RF-2", "A2", None).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[actix_web::test]
    async fn role_must_exist_when_assigning() {
        let (directory, store, _) = service();
        let user = directory.register_user("a", "RF-1", "A", None).await.unwrap();

        assert!(matches!(
            directory.assign_user_role(user.id, Some(3)).await,
            Err(AppError::NotFound { entity: "role", .. })
        ));

        let role = store.insert_role("Guard", &BTreeSet::new()).await.unwrap();
        let user = directory.assign_user_role(user.id, Some(role.id)).await.unwrap();
        assert_eq!(user.role_id, Some(role.id));

        let user = directory.assign_user_role(user.id, None).await.unwrap();
        assert_eq!(user.role_id, None);
    }

    #[actix_web::test]
    async fn devices_need_a_location() {
        let (directory, _, _) = service();
        assert!(matches!(
            directory.register_device("  ").await,
            Err(AppError::Validation(_))
        ));
        let device = directory.register_device("Gate A").await.unwrap();
        assert_eq!(device.location, "Gate A");
    }
}
