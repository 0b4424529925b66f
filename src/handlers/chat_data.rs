// src/handlers/chat_data.rs
use crate::handlers::{claims_user_id, internal_error};
use crate::middleware::auth::auth_middleware;
use crate::models::api::ApiResponse;
use crate::models::auth::{Claims, ErrorResponse};
use crate::models::chat::{ChatMessage, ChatSession};
use crate::models::pdf::PdfMeta;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
    routing::{get, Router},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

pub fn chat_data_routes() -> Router {
    Router::new()
        .route("/api/v1/chat_data/get_chat_session", get(get_chat_sessions))
        .route("/api/v1/chat_data/chat_history", get(chat_history))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn get_chat_sessions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user_id = claims_user_id(&claims)?;

    let rows = sqlx::query(
        "SELECT cs.id, cs.user_id, cs.pdf_id,
                pm.id AS doc_id, pm.user_id AS doc_user_id,
                pm.name AS doc_name, pm.hash AS doc_hash
         FROM chat_sessions cs
         LEFT JOIN pdf_meta pm ON pm.id = cs.pdf_id
         WHERE cs.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(internal_error)?;

    if rows.is_empty() {
        return Ok(Json(ApiResponse::new(404, "No records found", json!({}))));
    }

    let mut sessions = Vec::with_capacity(rows.len());
    for row in &rows {
        sessions.push(decode_session_row(row).map_err(internal_error)?);
    }

    Ok(Json(ApiResponse::new(
        200,
        "Chat sessions fetched successfully!!",
        json!({ "chat_sessions": sessions }),
    )))
}

fn decode_session_row(row: &PgRow) -> Result<serde_json::Value, sqlx::Error> {
    let session = ChatSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        pdf_id: row.try_get("pdf_id")?,
    };
    let pdf = match row.try_get::<Option<Uuid>, _>("doc_id")? {
        Some(id) => Some(PdfMeta {
            id,
            user_id: row.try_get("doc_user_id")?,
            name: row.try_get("doc_name")?,
            hash: row.try_get("doc_hash")?,
        }),
        None => None,
    };
    Ok(session_json(&session, pdf.as_ref()))
}

fn session_json(session: &ChatSession, pdf: Option<&PdfMeta>) -> serde_json::Value {
    json!({
        "id": session.id,
        "user_id": session.user_id,
        "pdf_id": session.pdf_id,
        "pdf": pdf,
    })
}

#[derive(Deserialize)]
struct HistoryQuery {
    session_id: Uuid,
}

async fn chat_history(
    Query(params): Query<HistoryQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ErrorResponse>)> {
    // History is keyed only by session id; any authenticated caller who
    // knows the id can read it.
    let messages = sqlx::query_as::<_, ChatMessage>(
        "SELECT id, session_id, role, content, created_at
         FROM chat_messages
         WHERE session_id = $1
         ORDER BY created_at ASC
         LIMIT 100",
    )
    .bind(params.session_id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(internal_error)?;

    if messages.is_empty() {
        return Ok(Json(ApiResponse::new(
            404,
            "No chat message found for this session",
            json!({}),
        )));
    }

    Ok(Json(ApiResponse::new(
        200,
        "Fetched chat history",
        json!({ "chat_history": messages }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    #[test]
    fn test_session_json_embeds_the_document() {
        let pdf_id = Uuid::new_v4();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            pdf_id: Some(pdf_id),
        };
        let pdf = PdfMeta {
            id: pdf_id,
            user_id: session.user_id,
            name: Some("report.pdf".to_string()),
            hash: "deadbeef".to_string(),
        };

        let value = session_json(&session, Some(&pdf));
        assert_eq!(value["pdf_id"], json!(pdf_id));
        assert_eq!(value["pdf"]["id"], json!(pdf_id));
        assert_eq!(value["pdf"]["name"], json!("report.pdf"));
        assert_eq!(value["pdf"]["hash"], json!("deadbeef"));
    }

    #[test]
    fn test_session_json_without_a_document_renders_null() {
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            pdf_id: None,
        };

        let value = session_json(&session, None);
        assert_eq!(value["pdf_id"], json!(null));
        assert_eq!(value["pdf"], json!(null));
    }

    #[test]
    fn test_history_query_requires_a_well_formed_session_id() {
        let uri: Uri = "/api/v1/chat_data/chat_history?session_id=11111111-1111-1111-1111-111111111111"
            .parse()
            .unwrap();
        let Query(params) = Query::<HistoryQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(
            params.session_id,
            Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
        );

        let bad: Uri = "/api/v1/chat_data/chat_history?session_id=zzz".parse().unwrap();
        assert!(Query::<HistoryQuery>::try_from_uri(&bad).is_err());
    }
}
