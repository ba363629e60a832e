use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use super::shift_calendar::{ShiftCalendar, ShiftDefinition};
use crate::error::{AppError, AppResult};
use crate::model::attendance::{Attendance, NewAttendance, ShiftSlot};
use crate::model::device::DeviceId;
use crate::store::{Store, StoreError};
use crate::utils::key_locks::KeyLocks;
use crate::utils::rfid_filter::RfidFilter;

/// A transition that lost a conditional write is re-read and retried.
const MAX_TRANSITION_ATTEMPTS: usize = 3;
const SLOT_LOCK_CAPACITY: u64 = 100_000;
const SLOT_LOCK_IDLE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transition {
    /// First scan of the slot at this location
    TimeIn,
    /// Scan earlier than the recorded time-in replaced it
    TimeInCorrected,
    TimeOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub transition: Transition,
    pub attendance: Attendance,
}

/// Turns card scans into attendance records.
///
/// Per slot the record moves NoRecord -> TimeInOnly -> Complete. Scans for the
/// same user, date and shift are serialised in-process and every write is
/// conditional on the state that was read, so concurrent scans settle on a
/// single row per location.
pub struct AttendanceEngine {
    store: Arc<dyn Store>,
    calendar: Arc<ShiftCalendar>,
    rfid_filter: Arc<RfidFilter>,
    /// Filter misses are final unless another process can register users.
    trust_filter_misses: bool,
    slot_locks: KeyLocks<ShiftSlot>,
}

impl AttendanceEngine {
    pub fn new(store: Arc<dyn Store>, calendar: Arc<ShiftCalendar>, rfid_filter: Arc<RfidFilter>) -> Self {
        Self {
            trust_filter_misses: !store.is_shared(),
            store,
            calendar,
            rfid_filter,
            slot_locks: KeyLocks::new(SLOT_LOCK_CAPACITY, SLOT_LOCK_IDLE),
        }
    }

    #[instrument(name = "attendance_scan", skip(self, rfid_code))]
    pub async fn record_scan(
        &self,
        rfid_code: &str,
        device_id: DeviceId,
        at: NaiveDateTime,
    ) -> AppResult<ScanOutcome> {
        let rfid_code = rfid_code.trim();
        if rfid_code.is_empty() {
            return Err(AppError::Validation("rfid_code must not be blank".into()));
        }

        let filter_hit = self.rfid_filter.might_contain(rfid_code);
        if !filter_hit && self.trust_filter_misses {
            debug!("RFID code rejected by filter");
            return Err(AppError::not_found("user with RFID code", rfid_code));
        }
        let user = self
            .store
            .find_user_by_rfid(rfid_code)
            .await?
            .ok_or_else(|| AppError::not_found("user with RFID code", rfid_code))?;
        if !filter_hit {
            debug!(user_id = user.id, "RFID code registered elsewhere, adding to filter");
            self.rfid_filter.insert(rfid_code);
        }

        let device = self
            .store
            .get_device(device_id)
            .await?
            .ok_or_else(|| AppError::not_found("device", device_id))?;

        let definition = self.calendar.classify(at.time())?;
        let slot = ShiftSlot {
            user_id: user.id,
            date: at.date(),
            shift: definition.shift,
        };

        let _guard = self.slot_locks.lock(slot.clone()).await;

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            if let Some(outcome) = self
                .apply_scan(&slot, definition, &device.location, at.time())
                .await?
            {
                info!(
                    user_id = user.id,
                    shift = %slot.shift,
                    location = %device.location,
                    transition = ?outcome.transition,
                    on_time = outcome.attendance.on_time,
                    "Scan recorded"
                );
                return Ok(outcome);
            }
            debug!(attempt, %slot, "Attendance changed underneath scan, retrying");
        }

        Err(AppError::Internal(format!(
            "attendance for {slot} kept changing during scan"
        )))
    }

    /// One read-decide-write pass. `None` means a conditional write lost a
    /// race and the pass has to be repeated against fresh state.
    async fn apply_scan(
        &self,
        slot: &ShiftSlot,
        definition: &ShiftDefinition,
        location: &str,
        time: NaiveTime,
    ) -> AppResult<Option<ScanOutcome>> {
        let records = self.store.find_slot_attendance(slot).await?;

        if let Some(open) = records.iter().find(|r| !r.is_complete()) {
            if open.location != location {
                warn!(
                    attendance_id = open.id,
                    opened_at = %open.location,
                    scanned_at = %location,
                    "Closing attendance from a different location"
                );
            }

            if time < open.time_in {
                let on_time = definition.is_on_time(time);
                return Ok(self
                    .store
                    .reset_time_in(open.id, time, on_time)
                    .await?
                    .map(|attendance| ScanOutcome {
                        transition: Transition::TimeInCorrected,
                        attendance,
                    }));
            }

            return Ok(self
                .store
                .close_attendance(open.id, time)
                .await?
                .map(|attendance| ScanOutcome {
                    transition: Transition::TimeOut,
                    attendance,
                }));
        }

        if records.iter().any(|r| r.location == location) {
            return Err(AppError::DuplicateEvent(format!(
                "attendance for {slot} at '{location}' is already complete"
            )));
        }

        let new = NewAttendance {
            user_id: slot.user_id,
            date: slot.date,
            shift: slot.shift,
            location: location.to_string(),
            time_in: time,
            on_time: definition.is_on_time(time),
        };

        match self.store.insert_attendance(new).await {
            Ok(attendance) => Ok(Some(ScanOutcome {
                transition: Transition::TimeIn,
                attendance,
            })),
            Err(StoreError::Conflict(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
