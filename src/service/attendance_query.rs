use std::sync::Arc;

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceFilter, AttendanceResponse};
use crate::models::{PageRequest, Paged};
use crate::store::Store;

/// Read side of attendance. Filters combine with AND; every absent filter
/// matches everything.
pub struct AttendanceQueryService {
    store: Arc<dyn Store>,
}

impl AttendanceQueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn filter_attendance(
        &self,
        filter: AttendanceFilter,
        page: PageRequest,
    ) -> AppResult<Paged<AttendanceResponse>> {
        let filter = filter.normalized();

        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(AppError::Validation(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }

        let result = self.store.filter_attendance(&filter, page).await?;
        debug!(
            total = result.total,
            page = page.page,
            size = page.size,
            "Attendance filtered"
        );
        Ok(result)
    }
}
