use crate::{
    api::parse_id_list,
    auth::{access::Requirement, auth::Principal},
    error::AppError,
    model::{
        permission::{Permission, PermissionCatalog},
        role::{ADMIN_ROLE, RoleId, RoleResponse, RoleSummary},
    },
    models::{ApiResponse, PageQuery},
    service::role::DeleteStatus,
    state::AppState,
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize)]
pub struct RoleListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    /// Case-insensitive substring of the role name
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    #[schema(example = "Technician")]
    pub name: String,
    #[serde(default)]
    #[schema(example = json!([1, 2]))]
    pub permission_ids: Vec<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    #[schema(example = "Senior Technician")]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleCreated {
    #[schema(example = 3)]
    pub id: RoleId,
}

#[derive(Debug, Deserialize)]
pub struct RoleAssignmentQuery {
    #[serde(alias = "roleId")]
    pub role_id: RoleId,
}

/// List roles
#[utoipa::path(
    get,
    path = "/api/role",
    params(
        ("page", Query, description = "0-based page number"),
        ("size", Query, description = "Items per page (1-100)"),
        ("name", Query, description = "Case-insensitive substring of the role name")
    ),
    responses(
        (status = 200, description = "Paged role summaries", body = Object, example = json!({
            "status": 200,
            "message": "Roles fetched",
            "data": { "data": [{ "id": 1, "name": "ADMIN" }], "page": 0, "size": 10, "total": 1 }
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    principal: Principal,
    state: web::Data<AppState>,
    query: web::Query<RoleListQuery>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::GetAllRoles)?;

    let page = PageQuery {
        page: query.page,
        size: query.size,
    }
    .page_request();
    let name = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let roles = state.roles.list_roles(name, page).await?.map(RoleSummary::from);
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Roles fetched", roles)))
}

/// Get role with its permissions
#[utoipa::path(
    get,
    path = "/api/role/{id}",
    params(("id", Path, description = "Role id")),
    responses(
        (status = 200, description = "Role detail", body = RoleResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Role not found")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    principal: Principal,
    state: web::Data<AppState>,
    path: web::Path<RoleId>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::GetRole)?;

    let role = state.roles.get_role(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Role fetched", RoleResponse::from(role))))
}

/// Create role
#[utoipa::path(
    post,
    path = "/api/role",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleCreated),
        (status = 400, description = "Blank name"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown permission id"),
        (status = 409, description = "Role name already exists")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    principal: Principal,
    state: web::Data<AppState>,
    payload: web::Json<CreateRoleRequest>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::CreateRole)?;

    let role = state
        .roles
        .create_role(&payload.name, &payload.permission_ids)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::created("Role created", RoleCreated { id: role.id })))
}

/// Rename role
#[utoipa::path(
    patch,
    path = "/api/role/{id}",
    params(("id", Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role name already exists, or ADMIN is involved")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    principal: Principal,
    state: web::Data<AppState>,
    path: web::Path<RoleId>,
    payload: web::Json<UpdateRoleRequest>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::UpdateRole)?;

    let role = state.roles.update_role(path.into_inner(), &payload.name).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Role updated", RoleResponse::from(role))))
}

/// Delete roles in bulk
///
/// Users holding a deleted role are left without one.
#[utoipa::path(
    delete,
    path = "/api/role/{ids}",
    params(("ids", Path, description = "Comma separated role ids, e.g. 3,4,9")),
    responses(
        (status = 200, description = "Per-id outcome", body = crate::service::role::DeleteReport),
        (status = 400, description = "Malformed id list"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn delete_roles(
    principal: Principal,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::DeleteRoles)?;

    let ids: Vec<RoleId> = parse_id_list(&path, "role")?;
    let report = state.roles.delete_roles(&ids).await?;

    let message = if report.is_complete() {
        "Roles deleted"
    } else {
        "Some roles were not deleted"
    };
    let missing: Vec<RoleId> = report
        .outcomes
        .iter()
        .filter(|o| o.status == DeleteStatus::NotFound)
        .map(|o| o.id)
        .collect();
    if !missing.is_empty() {
        info!(?missing, "Bulk role delete skipped unknown ids");
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(message, report)))
}

/// Assign permissions to a role (ADMIN only)
#[utoipa::path(
    patch,
    path = "/api/role/assignment/{permission_ids}",
    params(
        ("permission_ids", Path, description = "Comma separated permission ids"),
        ("role_id", Query, description = "Target role id")
    ),
    responses(
        (status = 200, description = "Role with its updated permissions", body = RoleResponse),
        (status = 403, description = "Caller is not ADMIN"),
        (status = 404, description = "Unknown role or permission")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn assign_permissions(
    principal: Principal,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<RoleAssignmentQuery>,
) -> Result<HttpResponse, AppError> {
    principal.require(Requirement::RoleNamed(ADMIN_ROLE))?;

    let permission_ids: Vec<u32> = parse_id_list(&path, "permission")?;
    let role = state
        .roles
        .assign_permissions(query.role_id, &permission_ids)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Permissions assigned", RoleResponse::from(role))))
}

/// Remove permissions from a role
#[utoipa::path(
    delete,
    path = "/api/role/unassignment/{permission_ids}",
    params(
        ("permission_ids", Path, description = "Comma separated permission ids"),
        ("role_id", Query, description = "Target role id")
    ),
    responses(
        (status = 200, description = "Role with its updated permissions", body = RoleResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown role or permission")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn unassign_permissions(
    principal: Principal,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<RoleAssignmentQuery>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::UnassignPermissionFromRole)?;

    let permission_ids: Vec<u32> = parse_id_list(&path, "permission")?;
    let role = state
        .roles
        .unassign_permissions(query.role_id, &permission_ids)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Permissions unassigned", RoleResponse::from(role))))
}

/// List the permission catalog
#[utoipa::path(
    get,
    path = "/api/permission",
    responses(
        (status = 200, description = "Every permission", body = [crate::model::permission::PermissionEntry]),
        (status = 403, description = "Forbidden")
    ),
    tag = "Role",
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(principal: Principal) -> Result<HttpResponse, AppError> {
    principal.require(Permission::GetAllPermissions)?;

    let entries = PermissionCatalog::global().entries();
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Permissions fetched", entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{bearer, peer, state, test_app, user_with_role};
    use actix_web::{http::StatusCode, test};
    use serde_json::{Value, json};
    use std::collections::BTreeSet;

    async fn technician(state: &AppState) -> u64 {
        user_with_role(state, "Technician", &[Permission::GetRole, Permission::GetAllRoles]).await
    }

    async fn seed_roles(state: &AppState, count: usize) {
        for i in 0..count {
            state
                .store
                .insert_role(&format!("Filler {i}"), &BTreeSet::new())
                .await
                .unwrap();
        }
    }

    #[actix_web::test]
    async fn technician_cannot_create_role() {
        let state = state();
        let user = technician(&state).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::post()
            .uri("/api/role")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .set_json(json!({ "name": "Intruder" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "FORBIDDEN");
        assert!(state.store.find_role_by_name("Intruder").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn technician_reads_existing_and_missing_roles() {
        let state = state();
        let user = technician(&state).await;
        seed_roles(&state, 4).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::get()
            .uri("/api/role/5")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["id"], 5);
        assert_eq!(body["data"]["name"], "Filler 3");

        let req = test::TestRequest::get()
            .uri("/api/role/6")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn denial_does_not_reveal_existence() {
        let state = state();
        let user = user_with_role(&state, "Auditor", &[Permission::FilterAttendance]).await;
        seed_roles(&state, 4).await;
        let app = test_app!(state).await;

        for uri in ["/api/role/5", "/api/role/99"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .peer_addr(peer())
                .insert_header(bearer(user))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[actix_web::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let state = state();
        let app = test_app!(state).await;

        let req = test::TestRequest::get()
            .uri("/api/role")
            .peer_addr(peer())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/role")
            .peer_addr(peer())
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        // valid token for a user that does not exist
        let req = test::TestRequest::get()
            .uri("/api/role")
            .peer_addr(peer())
            .insert_header(bearer(404))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn create_then_list_roles() {
        let state = state();
        let user = user_with_role(&state, "Manager", &[Permission::CreateRole, Permission::GetAllRoles]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::post()
            .uri("/api/role")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .set_json(json!({ "name": "Technician", "permission_ids": [1, 2] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["id"], 2);

        let req = test::TestRequest::post()
            .uri("/api/role")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .set_json(json!({ "name": "Technician" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri("/api/role?name=TECH&page=0&size=5")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["data"][0]["name"], "Technician");
    }

    #[actix_web::test]
    async fn assignment_requires_admin_role_name() {
        let state = state();
        let imposter = user_with_role(&state, "Operator", &[Permission::AssignPermissionToRole]).await;
        let admin = user_with_role(&state, ADMIN_ROLE, &[]).await;
        let target = state
            .store
            .insert_role("Technician", &BTreeSet::new())
            .await
            .unwrap();
        let app = test_app!(state).await;

        let uri = format!("/api/role/assignment/1,2?roleId={}", target.id);
        let req = test::TestRequest::patch()
            .uri(&uri)
            .peer_addr(peer())
            .insert_header(bearer(imposter))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::patch()
            .uri(&uri)
            .peer_addr(peer())
            .insert_header(bearer(admin))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = body["data"]["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["GET_ALL_ROLES", "GET_ROLE"]);
    }

    #[actix_web::test]
    async fn renaming_into_or_out_of_admin_is_rejected() {
        let state = state();
        let admin = state.roles.ensure_admin_role().await.unwrap();
        let editor = user_with_role(&state, "Editor", &[Permission::UpdateRole]).await;
        let editor_role = state.store.get_user(editor).await.unwrap().unwrap().role_id.unwrap();
        let app = test_app!(state).await;

        let attempts = [
            (admin.id, "formerly-admin"),
            (editor_role, ADMIN_ROLE),
        ];
        for (id, name) in attempts {
            let req = test::TestRequest::patch()
                .uri(&format!("/api/role/{id}"))
                .peer_addr(peer())
                .insert_header(bearer(editor))
                .set_json(json!({ "name": name }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CONFLICT, "{id} -> {name}");
        }

        let req = test::TestRequest::patch()
            .uri(&format!("/api/role/assignment/1?roleId={editor_role}"))
            .peer_addr(peer())
            .insert_header(bearer(editor))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.store.get_role(admin.id).await.unwrap().unwrap().name, ADMIN_ROLE);
    }

    #[actix_web::test]
    async fn bulk_delete_keeps_admin_role() {
        let state = state();
        let admin = state.roles.ensure_admin_role().await.unwrap();
        let user = user_with_role(&state, "Manager", &[Permission::DeleteRoles]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/role/{}", admin.id))
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["outcomes"][0]["status"], "PROTECTED");
        assert!(state.store.get_role(admin.id).await.unwrap().is_some());
    }

    #[actix_web::test]
    async fn unassign_unknown_permission_is_not_found() {
        let state = state();
        let user = user_with_role(&state, "Manager", &[Permission::UnassignPermissionFromRole]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::delete()
            .uri("/api/role/unassignment/1,999?role_id=1")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let role = state.store.get_role(1).await.unwrap().unwrap();
        assert!(role.has_permission(Permission::UnassignPermissionFromRole));
    }

    #[actix_web::test]
    async fn bulk_delete_reports_each_id() {
        let state = state();
        let user = user_with_role(&state, "Manager", &[Permission::DeleteRoles]).await;
        seed_roles(&state, 1).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::delete()
            .uri("/api/role/2,77")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["outcomes"][0]["status"], "DELETED");
        assert_eq!(body["data"]["outcomes"][1]["status"], "NOT_FOUND");
    }

    #[actix_web::test]
    async fn lists_permission_catalog() {
        let state = state();
        let user = user_with_role(&state, "Viewer", &[Permission::GetAllPermissions]).await;
        let app = test_app!(state).await;

        let req = test::TestRequest::get()
            .uri("/api/permission")
            .peer_addr(peer())
            .insert_header(bearer(user))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 12);
        assert_eq!(body["data"][0], json!({ "id": 1, "name": "GET_ALL_ROLES" }));
    }
}
