pub mod key_locks;
pub mod rfid_filter;
