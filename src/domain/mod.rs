pub mod actor;
pub mod auth;
pub mod message;
pub mod session;
