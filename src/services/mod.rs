pub mod auth_service;
pub mod conversation_service;
pub mod counterpart_service;
pub mod directory;
pub mod health_service;
pub mod live_conversation;
pub mod store;
