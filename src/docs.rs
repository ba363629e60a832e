use crate::api::attendance::ScanRequest;
use crate::api::directory::{AssignUserRoleRequest, CreateDeviceRequest, CreateUserRequest};
use crate::api::role::{CreateRoleRequest, RoleCreated, UpdateRoleRequest};
use crate::model::attendance::AttendanceResponse;
use crate::model::device::Device;
use crate::model::permission::PermissionEntry;
use crate::model::role::{RoleResponse, RoleSummary};
use crate::model::user::User;
use crate::service::attendance::Transition;
use crate::service::role::{DeleteOutcome, DeleteReport, DeleteStatus};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RFID Attendance API",
        version = "1.0.0",
        description = r#"
## RFID Attendance Backend

Card holders clock in and out by scanning RFID tags at readers placed around a
facility. Operators manage who may do what through roles and permissions.

### 🔹 Key Features
- **Roles & Permissions**
  - Create, rename and bulk-delete roles, grant or revoke catalog permissions
- **Directory**
  - Register card holders and scanning devices, change a holder's role
- **Attendance**
  - Scans are classified into MORNING / AFTERNOON / EVENING shifts with on-time tracking
  - Filter attendance by date range, shift, username and location

### 🔐 Security
Administrative endpoints require a **JWT Bearer** token and a matching permission.
Assigning permissions is reserved for the **ADMIN** role.
The device scan endpoint is open to reader firmware and rate limited.

### 📦 Response Format
- `{ status, message, data }` envelope
- Errors as `{ status, code, error }`
- Pagination with 0-based `page` and `size`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::role::list_roles,
        crate::api::role::get_role,
        crate::api::role::create_role,
        crate::api::role::update_role,
        crate::api::role::delete_roles,
        crate::api::role::assign_permissions,
        crate::api::role::unassign_permissions,
        crate::api::role::list_permissions,

        crate::api::directory::create_user,
        crate::api::directory::assign_user_role,
        crate::api::directory::create_device,

        crate::api::attendance::filter_attendance,
        crate::api::attendance::record_scan
    ),
    components(
        schemas(
            CreateRoleRequest,
            UpdateRoleRequest,
            RoleCreated,
            RoleSummary,
            RoleResponse,
            PermissionEntry,
            DeleteReport,
            DeleteOutcome,
            DeleteStatus,
            CreateUserRequest,
            AssignUserRoleRequest,
            CreateDeviceRequest,
            User,
            Device,
            ScanRequest,
            Transition,
            AttendanceResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Role", description = "Role and permission management APIs"),
        (name = "Directory", description = "Card holder and device registration APIs"),
        (name = "Attendance", description = "Attendance query APIs"),
        (name = "Device", description = "Reader-facing scan API"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme the protected paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
