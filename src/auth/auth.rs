use crate::{
    auth::access::{Requirement, decide},
    error::{AppError, AppResult},
    model::{role::Role, user::UserId},
    models::Claims,
    state::AppState,
    store::Store,
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::LocalBoxFuture;
use tracing::info;

/// The caller of an administrative request, resolved from its bearer token.
///
/// User and role are read from the store on every request so role changes
/// apply to the very next call.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub role: Option<Role>,
}

impl Principal {
    pub async fn resolve(store: &dyn Store, claims: &Claims) -> AppResult<Self> {
        let user = store
            .get_user(claims.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Unknown user".into()))?;

        let role = match user.role_id {
            Some(role_id) => store.get_role(role_id).await?,
            None => None,
        };

        Ok(Principal {
            user_id: user.id,
            username: user.username,
            role,
        })
    }

    /// Fails with `Forbidden` unless the principal meets `requirement`.
    pub fn require(&self, requirement: impl Into<Requirement>) -> AppResult<()> {
        let requirement = requirement.into();
        if decide(self.role.as_ref(), requirement).is_allowed() {
            return Ok(());
        }

        info!(
            user_id = self.user_id,
            username = %self.username,
            role = ?self.role.as_ref().map(|r| r.name.as_str()),
            %requirement,
            "Access denied"
        );
        Err(AppError::Forbidden("Access denied".into()))
    }
}

impl FromRequest for Principal {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<Claims>().cloned();
        let state = req.app_data::<Data<AppState>>().cloned();

        Box::pin(async move {
            let claims = claims.ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;
            let state =
                state.ok_or_else(|| AppError::Internal("Application state missing".into()))?;
            Principal::resolve(state.store.as_ref(), &claims).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::permission::Permission;
    use crate::model::role::ADMIN_ROLE;
    use crate::model::user::NewUser;
    use crate::store::memory::MemoryStore;
    use std::collections::BTreeSet;

    fn claims(user_id: UserId) -> Claims {
        Claims {
            user_id,
            sub: "someone".into(),
            exp: usize::MAX,
        }
    }

    #[actix_web::test]
    async fn resolves_user_and_role() {
        let store = MemoryStore::new();
        let perms: BTreeSet<_> = [Permission::GetRole].into_iter().collect();
        let role = store.insert_role("Technician", &perms).await.unwrap();
        let user = store
            .insert_user(NewUser {
                username: "tech".into(),
                rfid_code: "T1".into(),
                full_name: "Tech One".into(),
                role_id: Some(role.id),
            })
            .await
            .unwrap();

        let principal = Principal::resolve(&store, &claims(user.id)).await.unwrap();
        assert_eq!(principal.username, "tech");
        assert!(principal.require(Permission::GetRole).is_ok());
        assert!(matches!(
            principal.require(Permission::CreateRole),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            principal.require(Requirement::RoleNamed(ADMIN_ROLE)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[actix_web::test]
    async fn unknown_user_is_unauthorized() {
        let store = MemoryStore::new();
        let err = Principal::resolve(&store, &claims(42)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
