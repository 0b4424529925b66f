pub mod api;
pub mod auth;
pub mod chat;
pub mod pdf;
