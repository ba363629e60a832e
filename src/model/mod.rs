pub mod attendance;
pub mod device;
pub mod permission;
pub mod role;
pub mod shift;
pub mod user;
