use crate::{
    auth::auth::Principal,
    error::AppError,
    model::{permission::Permission, role::RoleId, user::UserId},
    models::ApiResponse,
    state::AppState,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "04A1B2C3")]
    pub rfid_code: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = 3, nullable = true)]
    pub role_id: Option<RoleId>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignUserRoleRequest {
    /// `null` removes the user's role
    #[schema(example = 3, nullable = true)]
    pub role_id: Option<RoleId>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDeviceRequest {
    #[schema(example = "Warehouse gate B")]
    pub location: String,
}

/// Register a card holder
#[utoipa::path(
    post,
    path = "/api/user",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User registered", body = crate::model::user::User),
        (status = 400, description = "Blank field"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown role"),
        (status = 409, description = "Username or RFID code already registered")
    ),
    tag = "Directory",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    principal: Principal,
    state: web::Data<AppState>,
    payload: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::CreateUser)?;

    let user = state
        .directory
        .register_user(
            &payload.username,
            &payload.rfid_code,
            &payload.full_name,
            payload.role_id,
        )
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::created("User registered", user)))
}

/// Change or clear a user's role
#[utoipa::path(
    patch,
    path = "/api/user/{id}/role",
    params(("id", Path, description = "User id")),
    request_body = AssignUserRoleRequest,
    responses(
        (status = 200, description = "User updated", body = crate::model::user::User),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown user or role")
    ),
    tag = "Directory",
    security(("bearer_auth" = []))
)]
pub async fn assign_user_role(
    principal: Principal,
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    payload: web::Json<AssignUserRoleRequest>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::AssignRoleToUser)?;

    let user = state
        .directory
        .assign_user_role(path.into_inner(), payload.role_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("User role updated", user)))
}

/// Register a scanning device
#[utoipa::path(
    post,
    path = "/api/device",
    request_body = CreateDeviceRequest,
    responses(
        (status = 201, description = "Device registered", body = crate::model::device::Device),
        (status = 400, description = "Blank location"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Directory",
    security(("bearer_auth" = []))
)]
pub async fn create_device(
    principal: Principal,
    state: web::Data<AppState>,
    payload: web::Json<CreateDeviceRequest>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::CreateDevice)?;

    let device = state.directory.register_device(&payload.location).await?;
    Ok(HttpResponse::Created().json(ApiResponse::created("Device registered", device)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{bearer, peer, state, test_app, user_with_role};
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};

    #[actix_web::test]
    async fn registers_user_and_makes_code_scannable() {
        let state = state();
        let admin = user_with_role(&state, "Registrar", &[Permission::CreateUser]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::post()
            .uri("/api/user")
            .peer_addr(peer())
            .insert_header(bearer(admin))
            .set_json(json!({
                "username": "jdoe",
                "rfid_code": "04A1B2C3",
                "full_name": "John Doe",
                "role_id": null
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["username"], "jdoe");

        assert!(state.rfid_filter.might_contain("04A1B2C3"));

        let req = test::TestRequest::post()
            .uri("/api/user")
            .peer_addr(peer())
            .insert_header(bearer(admin))
            .set_json(json!({
                "username": "other",
                "rfid_code": "04A1B2C3",
                "full_name": "Other"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn clears_user_role() {
        let state = state();
        let admin = user_with_role(&state, "Registrar", &[Permission::AssignRoleToUser]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::patch()
            .uri(&format!("/api/user/{admin}/role"))
            .peer_addr(peer())
            .insert_header(bearer(admin))
            .set_json(json!({ "role_id": null }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(state.store.get_user(admin).await.unwrap().unwrap().role_id, None);

        // without a role the same call is now forbidden
        let req = test::TestRequest::patch()
            .uri(&format!("/api/user/{admin}/role"))
            .peer_addr(peer())
            .insert_header(bearer(admin))
            .set_json(json!({ "role_id": 1 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn device_needs_permission_and_location() {
        let state = state();
        let installer = user_with_role(&state, "Installer", &[Permission::CreateDevice]).await;
        let outsider = user_with_role(&state, "Outsider", &[]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::post()
            .uri("/api/device")
            .peer_addr(peer())
            .insert_header(bearer(outsider))
            .set_json(json!({ "location": "Gate A" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/device")
            .peer_addr(peer())
            .insert_header(bearer(installer))
            .set_json(json!({ "location": "  " }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/device")
            .peer_addr(peer())
            .insert_header(bearer(installer))
            .set_json(json!({ "location": "Gate A" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["location"], "Gate A");
    }
}
