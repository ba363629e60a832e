use std::str::FromStr;

use crate::{
    auth::auth::Principal,
    error::AppError,
    model::{attendance::AttendanceFilter, device::DeviceId, permission::Permission, shift::Shift},
    models::{ApiResponse, PageQuery},
    state::AppState,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub shift: Option<String>,
    pub username: Option<String>,
    pub location: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl AttendanceQuery {
    fn filter(&self) -> Result<AttendanceFilter, AppError> {
        let shift = self
            .shift
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Shift::from_str(s).map_err(|_| AppError::Validation(format!("unknown shift '{s}'")))
            })
            .transpose()?;

        Ok(AttendanceFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            shift,
            username: self.username.clone(),
            location: self.location.clone(),
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanRequest {
    #[schema(example = "04A1B2C3")]
    pub rfid_code: String,
    #[schema(example = 7)]
    pub device_id: DeviceId,
}

/// Filter attendance records
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(
        ("start_date", Query, description = "Inclusive start date (YYYY-MM-DD)"),
        ("end_date", Query, description = "Inclusive end date (YYYY-MM-DD)"),
        ("shift", Query, description = "MORNING, AFTERNOON or EVENING"),
        ("username", Query, description = "Case-insensitive substring of the username"),
        ("location", Query, description = "Substring of the scan location"),
        ("page", Query, description = "0-based page number"),
        ("size", Query, description = "Items per page (1-100)")
    ),
    responses(
        (status = 200, description = "Paged attendance, newest date first", body = Object, example = json!({
            "status": 200,
            "message": "Attendance fetched",
            "data": {
                "data": [{
                    "id": 10,
                    "rfid_code": "04A1B2C3",
                    "full_name": "John Doe",
                    "username": "jdoe",
                    "date": "2026-01-05",
                    "shift": "MORNING",
                    "location": "Warehouse gate B",
                    "time_in": "08:05:00",
                    "time_out": "12:01:00",
                    "on_time": true
                }],
                "page": 0,
                "size": 10,
                "total": 1
            }
        })),
        (status = 400, description = "Malformed filter"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn filter_attendance(
    principal: Principal,
    state: web::Data<AppState>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, AppError> {
    principal.require(Permission::FilterAttendance)?;

    let filter = query.filter()?;
    let page = PageQuery {
        page: query.page,
        size: query.size,
    }
    .page_request();

    let result = state.attendance_query.filter_attendance(filter, page).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Attendance fetched", result)))
}

/// Record an RFID scan
///
/// Called by reader firmware. The server clock decides the scan time.
#[utoipa::path(
    post,
    path = "/device/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Transition applied", body = Object, example = json!({
            "status": 200,
            "message": "Scan recorded",
            "data": {
                "transition": "TIME_IN",
                "attendance": {
                    "id": 10,
                    "user_id": 1,
                    "date": "2026-01-05",
                    "shift": "MORNING",
                    "location": "Warehouse gate B",
                    "time_in": "08:05:00",
                    "time_out": null,
                    "on_time": true
                }
            }
        })),
        (status = 404, description = "Unknown RFID code or device"),
        (status = 409, description = "Attendance for this shift is already complete"),
        (status = 422, description = "Scan time is outside every shift")
    ),
    tag = "Device"
)]
pub async fn record_scan(
    state: web::Data<AppState>,
    payload: web::Json<ScanRequest>,
) -> Result<HttpResponse, AppError> {
    let now = (state.clock)();
    let outcome = state
        .attendance
        .record_scan(&payload.rfid_code, payload.device_id, now)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Scan recorded", outcome)))
}
