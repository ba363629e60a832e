use chrono::{Duration, NaiveTime};
use thiserror::Error;

use crate::error::AppError;
use crate::model::shift::Shift;

/// Grace after the start of a shift that still counts as on time.
pub const DEFAULT_GRACE_MINUTES: i64 = 15;
/// How long before the start and after the end a window stays open.
pub const DEFAULT_SLACK_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftDefinition {
    pub shift: Shift,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub grace: Duration,
    pub slack: Duration,
}

impl ShiftDefinition {
    pub fn new(shift: Shift, start: NaiveTime, end: NaiveTime, grace: Duration, slack: Duration) -> Self {
        Self {
            shift,
            start,
            end,
            grace,
            slack,
        }
    }

    pub fn opens_at(&self) -> NaiveTime {
        self.start.overflowing_sub_signed(self.slack).0
    }

    pub fn closes_at(&self) -> NaiveTime {
        self.end.overflowing_add_signed(self.slack).0
    }

    /// Latest scan time that is still on time.
    pub fn on_time_until(&self) -> NaiveTime {
        self.start.overflowing_add_signed(self.grace).0
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.opens_at() <= time && time <= self.closes_at()
    }

    pub fn is_on_time(&self, time: NaiveTime) -> bool {
        time <= self.on_time_until()
    }

    fn validate(&self) -> Result<(), CalendarError> {
        if self.start >= self.end {
            return Err(CalendarError::EmptyShift(self.shift));
        }
        if self.grace < Duration::zero() || self.slack < Duration::zero() {
            return Err(CalendarError::NegativeDuration(self.shift));
        }
        let (_, before) = self.start.overflowing_sub_signed(self.slack);
        let (_, after) = self.end.overflowing_add_signed(self.slack);
        if before != 0 || after != 0 {
            return Err(CalendarError::CrossesMidnight(self.shift));
        }
        let (on_time_until, wrapped) = self.start.overflowing_add_signed(self.grace);
        if wrapped != 0 || on_time_until > self.end {
            return Err(CalendarError::GraceExceedsShift(self.shift));
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("calendar has no shifts")]
    Empty,
    #[error("{0} must start before it ends")]
    EmptyShift(Shift),
    #[error("{0} has a negative grace or slack")]
    NegativeDuration(Shift),
    #[error("{0} window crosses midnight")]
    CrossesMidnight(Shift),
    #[error("{0} grace period runs past the end of the shift")]
    GraceExceedsShift(Shift),
    #[error("{0} window overlaps {1}")]
    Overlap(Shift, Shift),
}

/// Ordered, non-overlapping shift windows within one day.
#[derive(Debug, Clone)]
pub struct ShiftCalendar {
    shifts: Vec<ShiftDefinition>,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

impl ShiftCalendar {
    /// Windows must be ordered by start time. Adjacent windows may touch; the
    /// earlier shift wins at the shared instant.
    pub fn new(shifts: Vec<ShiftDefinition>) -> Result<Self, CalendarError> {
        if shifts.is_empty() {
            return Err(CalendarError::Empty);
        }
        for definition in &shifts {
            definition.validate()?;
        }
        for pair in shifts.windows(2) {
            if pair[1].opens_at() < pair[0].closes_at() {
                return Err(CalendarError::Overlap(pair[0].shift, pair[1].shift));
            }
        }
        Ok(Self { shifts })
    }

    /// MORNING 08:00-12:00, AFTERNOON 13:00-17:00, EVENING 18:00-22:00.
    pub fn standard() -> Result<Self, CalendarError> {
        let grace = Duration::minutes(DEFAULT_GRACE_MINUTES);
        let slack = Duration::minutes(DEFAULT_SLACK_MINUTES);
        Self::new(vec![
            ShiftDefinition::new(Shift::Morning, hm(8, 0), hm(12, 0), grace, slack),
            ShiftDefinition::new(Shift::Afternoon, hm(13, 0), hm(17, 0), grace, slack),
            ShiftDefinition::new(Shift::Evening, hm(18, 0), hm(22, 0), grace, slack),
        ])
    }

    pub fn shifts(&self) -> &[ShiftDefinition] {
        &self.shifts
    }

    pub fn definition(&self, shift: Shift) -> Option<&ShiftDefinition> {
        self.shifts.iter().find(|d| d.shift == shift)
    }

    pub fn resolve(&self, time: NaiveTime) -> Option<&ShiftDefinition> {
        self.shifts.iter().find(|d| d.contains(time))
    }

    pub fn classify(&self, time: NaiveTime) -> Result<&ShiftDefinition, AppError> {
        self.resolve(time).ok_or(AppError::UnrecognizedShift(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn standard_calendar_is_valid() {
        let standard = ShiftCalendar::standard().expect("standard calendar validates");
        let shifts: Vec<_> = standard.shifts().iter().map(|d| d.shift).collect();
        assert_eq!(shifts, vec![Shift::Morning, Shift::Afternoon, Shift::Evening]);
    }

    #[test]
    fn on_time_boundary_is_start_plus_grace() {
        let calendar = ShiftCalendar::standard().unwrap();
        let morning = calendar.definition(Shift::Morning).unwrap();

        assert!(morning.is_on_time(hms(7, 40, 0)));
        assert!(morning.is_on_time(hms(8, 15, 0)));
        assert!(!morning.is_on_time(hms(8, 15, 1)));
    }

    #[test]
    fn resolves_by_window_including_slack() {
        let calendar = ShiftCalendar::standard().unwrap();

        assert_eq!(calendar.resolve(hms(7, 30, 0)).unwrap().shift, Shift::Morning);
        assert_eq!(calendar.resolve(hms(12, 29, 59)).unwrap().shift, Shift::Morning);
        // 12:30 is shared by MORNING's close and AFTERNOON's open
        assert_eq!(calendar.resolve(hms(12, 30, 0)).unwrap().shift, Shift::Morning);
        assert_eq!(calendar.resolve(hms(12, 30, 1)).unwrap().shift, Shift::Afternoon);
        assert_eq!(calendar.resolve(hms(21, 0, 0)).unwrap().shift, Shift::Evening);
    }

    #[test]
    fn times_outside_every_window_are_unrecognized() {
        let calendar = ShiftCalendar::standard().unwrap();

        assert!(calendar.resolve(hms(7, 29, 59)).is_none());
        assert!(calendar.resolve(hms(23, 0, 0)).is_none());
        assert!(matches!(
            calendar.classify(hms(3, 0, 0)),
            Err(AppError::UnrecognizedShift(_))
        ));
    }

    #[test]
    fn rejects_overlapping_windows() {
        let slack = Duration::minutes(45);
        let grace = Duration::minutes(5);
        let err = ShiftCalendar::new(vec![
            ShiftDefinition::new(Shift::Morning, hms(8, 0, 0), hms(12, 0, 0), grace, slack),
            ShiftDefinition::new(Shift::Afternoon, hms(13, 0, 0), hms(17, 0, 0), grace, slack),
        ])
        .unwrap_err();

        assert_eq!(err, CalendarError::Overlap(Shift::Morning, Shift::Afternoon));
    }

    #[test]
    fn rejects_invalid_definitions() {
        let zero = Duration::zero();
        assert_eq!(
            ShiftCalendar::new(vec![]).unwrap_err(),
            CalendarError::Empty
        );
        assert_eq!(
            ShiftCalendar::new(vec![ShiftDefinition::new(
                Shift::Evening,
                hms(22, 0, 0),
                hms(6, 0, 0),
                zero,
                zero
            )])
            .unwrap_err(),
            CalendarError::EmptyShift(Shift::Evening)
        );
        assert_eq!(
            ShiftCalendar::new(vec![ShiftDefinition::new(
                Shift::Evening,
                hms(18, 0, 0),
                hms(23, 50, 0),
                zero,
                Duration::minutes(30)
            )])
            .unwrap_err(),
            CalendarError::CrossesMidnight(Shift::Evening)
        );
        assert_eq!(
            ShiftCalendar::new(vec![ShiftDefinition::new(
                Shift::Morning,
                hms(8, 0, 0),
                hms(8, 10, 0),
                Duration::minutes(15),
                zero
            )])
            .unwrap_err(),
            CalendarError::GraceExceedsShift(Shift::Morning)
        );
    }
}
