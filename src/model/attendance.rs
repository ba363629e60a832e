use chrono::{NaiveDate, NaiveTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{shift::Shift, user::UserId};

pub type AttendanceId = u64;

/// One row per (user, date, shift, location). `time_out` stays empty until the
/// holder scans again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub shift: Shift,
    pub location: String,
    pub time_in: NaiveTime,
    pub time_out: Option<NaiveTime>,
    pub on_time: bool,
}

impl Attendance {
    pub fn is_complete(&self) -> bool {
        self.time_out.is_some()
    }

    pub fn slot(&self) -> ShiftSlot {
        ShiftSlot {
            user_id: self.user_id,
            date: self.date,
            shift: self.shift,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub shift: Shift,
    pub location: String,
    pub time_in: NaiveTime,
    pub on_time: bool,
}

/// A user's attendance for one shift on one day, across every location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display(fmt = "user {} on {} ({})", user_id, date, shift)]
pub struct ShiftSlot {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub shift: Shift,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AttendanceFilter {
    /// Inclusive lower bound on the attendance date
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the attendance date
    pub end_date: Option<NaiveDate>,
    pub shift: Option<Shift>,
    /// Case-insensitive substring of the username
    pub username: Option<String>,
    /// Substring of the scan location
    pub location: Option<String>,
}

impl AttendanceFilter {
    /// Blank text filters are treated as absent.
    pub fn normalized(mut self) -> Self {
        self.username = non_blank(self.username);
        self.location = non_blank(self.location);
        self
    }

    pub fn matches(&self, record: &Attendance, username: &str) -> bool {
        if self.start_date.is_some_and(|start| record.date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| record.date > end) {
            return false;
        }
        if self.shift.is_some_and(|shift| record.shift != shift) {
            return false;
        }
        if let Some(needle) = &self.username {
            if !username.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(needle) = &self.location {
            if !record.location.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttendanceResponse {
    #[schema(example = 10)]
    pub id: AttendanceId,
    #[schema(example = "04A1B2C3")]
    pub rfid_code: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "MORNING", value_type = String)]
    pub shift: Shift,
    #[schema(example = "Warehouse gate B")]
    pub location: String,
    #[schema(example = "08:05:00", value_type = String)]
    pub time_in: NaiveTime,
    #[schema(example = "12:01:00", value_type = String, nullable = true)]
    pub time_out: Option<NaiveTime>,
    #[schema(example = true)]
    pub on_time: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: NaiveDate, shift: Shift, location: &str) -> Attendance {
        Attendance {
            id: 1,
            user_id: 1,
            date,
            shift,
            location: location.to_string(),
            time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            time_out: None,
            on_time: true,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let filter = AttendanceFilter::default();
        assert!(filter.matches(&record(day, Shift::Evening, "Dock"), "anyone"));
    }

    #[test]
    fn filters_combine_with_and() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let filter = AttendanceFilter {
            start_date: Some(day),
            end_date: Some(day),
            shift: Some(Shift::Morning),
            username: Some("DOE".into()),
            location: Some("gate".into()),
        };

        assert!(filter.matches(&record(day, Shift::Morning, "North gate"), "jdoe"));
        assert!(!filter.matches(&record(day, Shift::Afternoon, "North gate"), "jdoe"));
        assert!(!filter.matches(&record(day, Shift::Morning, "Dock"), "jdoe"));
        assert!(!filter.matches(&record(day, Shift::Morning, "North gate"), "asmith"));
        let next = day.succ_opt().unwrap();
        assert!(!filter.matches(&record(next, Shift::Morning, "North gate"), "jdoe"));
    }

    #[test]
    fn blank_text_filters_are_dropped() {
        let filter = AttendanceFilter {
            username: Some("   ".into()),
            location: Some(" gate ".into()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(filter.username, None);
        assert_eq!(filter.location.as_deref(), Some("gate"));
    }
}
