use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use crate::service::attendance::AttendanceEngine;
use crate::service::attendance_query::AttendanceQueryService;
use crate::service::directory::DirectoryService;
use crate::service::role::RoleService;
use crate::service::shift_calendar::ShiftCalendar;
use crate::store::Store;
use crate::utils::rfid_filter::RfidFilter;

const RFID_WARMUP_BATCH: usize = 500;

/// Source of scan timestamps. Device scans are stamped on arrival.
pub type Clock = fn() -> NaiveDateTime;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Shared application state, handed to handlers as `web::Data<AppState>`.
///
/// Every service holds the same store, and the directory and attendance engine
/// share one RFID filter so new cards are scannable as soon as they are
/// registered.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub rfid_filter: Arc<RfidFilter>,
    pub roles: RoleService,
    pub directory: DirectoryService,
    pub attendance: AttendanceEngine,
    pub attendance_query: AttendanceQueryService,
    pub clock: Clock,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, calendar: ShiftCalendar) -> Self {
        let rfid_filter = Arc::new(RfidFilter::default());

        Self {
            roles: RoleService::new(store.clone()),
            directory: DirectoryService::new(store.clone(), rfid_filter.clone()),
            attendance: AttendanceEngine::new(store.clone(), Arc::new(calendar), rfid_filter.clone()),
            attendance_query: AttendanceQueryService::new(store.clone()),
            rfid_filter,
            store,
            clock: local_now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Loads registered RFID codes into the filter.
    pub async fn warm_up(&self) -> anyhow::Result<usize> {
        self.rfid_filter
            .warmup(self.store.as_ref(), RFID_WARMUP_BATCH)
            .await
    }
}
