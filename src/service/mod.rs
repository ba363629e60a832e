pub mod attendance;
pub mod attendance_query;
pub mod directory;
pub mod role;
pub mod shift_calendar;
