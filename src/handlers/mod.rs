// src/handlers/mod.rs
pub mod auth;
pub mod chat;
pub mod chat_data;
pub mod pdf;

use crate::models::auth::{Claims, ErrorResponse};
use axum::{http::StatusCode, response::Json};
use uuid::Uuid;

pub(crate) fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!("Internal error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            message: "Internal server error".to_string(),
        }),
    )
}

/// Reads the authenticated user id out of verified claims. The subject is
/// always a UUID minted at login, so a parse failure is a server fault.
pub(crate) fn claims_user_id(claims: &Claims) -> Result<Uuid, (StatusCode, Json<ErrorResponse>)> {
    claims.sub.parse::<Uuid>().map_err(internal_error)
}
