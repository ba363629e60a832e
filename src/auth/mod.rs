pub mod access;
pub mod auth;
pub mod jwt;
pub mod middleware;
