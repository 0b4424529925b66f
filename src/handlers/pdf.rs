// src/handlers/pdf.rs
use crate::handlers::{claims_user_id, internal_error};
use crate::middleware::auth::auth_middleware;
use crate::models::api::ApiResponse;
use crate::models::auth::{Claims, ErrorResponse};
use crate::models::pdf::PdfMeta;
use crate::services::pdf_processor::{extract_text, split_text};
use crate::AppState;
use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub fn pdf_routes() -> Router {
    Router::new()
        .route("/api/v1/pdf/upload", post(upload_pdf))
        .route_layer(axum::middleware::from_fn(auth_middleware))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB limit for uploads
}

/// Dedup key for uploaded documents. The same bytes always map to the same
/// fingerprint, whatever the file was named.
fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
        }),
    )
}

async fn upload_pdf(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user_id = claims_user_id(&claims)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("Malformed multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().map(|n| n.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|_| bad_request("Malformed multipart body"))?;
        upload = Some((name, data));
    }
    let Some((name, data)) = upload else {
        return Err(bad_request("No file uploaded"));
    };

    let hash = fingerprint(&data);

    let existing = sqlx::query_as::<_, PdfMeta>(
        "SELECT id, user_id, name, hash FROM pdf_meta WHERE user_id = $1 AND hash = $2",
    )
    .bind(user_id)
    .bind(&hash)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(internal_error)?;

    if let Some(existing) = existing {
        tracing::info!("📄 Duplicate upload of {} by user {}", hash, user_id);
        return Ok(Json(ApiResponse::new(
            200,
            "PDF already exists for this user",
            json!({ "id": existing.id, "name": existing.name, "hash": existing.hash }),
        )));
    }

    let text = match extract_text(&data) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("PDF text extraction failed: {}", e);
            return Err(bad_request("Unable to decode PDF file"));
        }
    };

    let chunks = split_text(&text);
    let point_count = state
        .qdrant_client
        .upsert_chunks(&chunks, &hash, &state.gemini_client)
        .await
        .map_err(internal_error)?;

    // A concurrent upload of the same bytes loses the insert race but still
    // reads back the surviving row.
    sqlx::query(
        "INSERT INTO pdf_meta (id, user_id, name, hash) VALUES ($1, $2, $3, $4)
         ON CONFLICT (user_id, hash) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&name)
    .bind(&hash)
    .execute(&state.db_pool)
    .await
    .map_err(internal_error)?;

    let record = sqlx::query_as::<_, PdfMeta>(
        "SELECT id, user_id, name, hash FROM pdf_meta WHERE user_id = $1 AND hash = $2",
    )
    .bind(user_id)
    .bind(&hash)
    .fetch_one(&state.db_pool)
    .await
    .map_err(internal_error)?;

    tracing::info!(
        "📄 Uploaded {:?} for user {} ({} chunks embedded)",
        record.name,
        user_id,
        point_count
    );

    Ok(Json(ApiResponse::new(
        200,
        "PDF uploaded and embedded",
        json!({ "id": record.id, "name": record.name, "hash": record.hash }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_lowercase_hex_sha256_of_the_bytes() {
        assert_eq!(
            fingerprint(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_fingerprint_tracks_content_not_length() {
        let a = fingerprint(b"version one of the report");
        let b = fingerprint(b"version two of the report");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(b.len(), 64);
    }
}
