pub mod attendance;
pub mod directory;
pub mod role;

use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Parses a comma separated id list such as `1,2,3` from a path segment.
pub fn parse_id_list<T: FromStr>(raw: &str, what: &str) -> AppResult<Vec<T>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| AppError::Validation(format!("invalid {what} id '{s}'")))
        })
        .collect::<AppResult<Vec<T>>>()?;

    if ids.is_empty() {
        return Err(AppError::Validation(format!("at least one {what} id is required")));
    }
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeSet;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use actix_web::web::Data;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use crate::config::{Config, StorageBackend};
    use crate::model::permission::Permission;
    use crate::model::user::{NewUser, UserId};
    use crate::models::Claims;
    use crate::service::shift_calendar::ShiftCalendar;
    use crate::state::AppState;
    use crate::store::memory::MemoryStore;

    pub const SECRET: &str = "test-secret";

    pub fn config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            jwt_secret: SECRET.into(),
            storage_backend: StorageBackend::Memory,
            database_url: None,
            api_prefix: "/api".into(),
            rate_admin_per_min: 1000,
            rate_scan_per_min: 1000,
            log_dir: "logs".into(),
        }
    }

    pub fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    pub fn state() -> Data<AppState> {
        Data::new(AppState::new(Arc::new(MemoryStore::new()), ShiftCalendar::standard().unwrap()))
    }

    pub fn bearer(user_id: UserId) -> (&'static str, String) {
        let claims = Claims {
            user_id,
            sub: format!("user-{user_id}"),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
            .unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    /// Creates a role with `permissions` and a user holding it.
    pub async fn user_with_role(
        state: &AppState,
        role_name: &str,
        permissions: &[Permission],
    ) -> UserId {
        let permissions: BTreeSet<_> = permissions.iter().copied().collect();
        let role = state.store.insert_role(role_name, &permissions).await.unwrap();
        let user = state
            .store
            .insert_user(NewUser {
                username: role_name.to_lowercase(),
                rfid_code: format!("RF-{}", role.id),
                full_name: role_name.into(),
                role_id: Some(role.id),
            })
            .await
            .unwrap();
        user.id
    }

    macro_rules! test_app {
        ($state:expr) => {
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data($state.clone())
                    .app_data(actix_web::web::Data::new(
                        $crate::api::test_support::config(),
                    ))
                    .configure(|cfg| {
                        $crate::routes::configure(cfg, $crate::api::test_support::config())
                    }),
            )
        };
    }
    pub(crate) use test_app;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_ids() {
        let ids: Vec<u32> = parse_id_list("1, 2,3,", "role").unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_garbage_and_empty_lists() {
        assert!(matches!(
            parse_id_list::<u32>("1,x", "role"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_id_list::<u32>(" , ", "permission"),
            Err(AppError::Validation(_))
        ));
    }
}
