// src/handlers/chat.rs
use crate::gemini_client::GeminiError;
use crate::handlers::auth::verify_token;
use crate::middleware::auth::cookie_value;
use crate::models::chat::{Role, Transcript};
use crate::qdrant_client::VectorStoreError;
use crate::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseCode, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Trailer frame marking the end of one streamed answer.
const END_OF_STREAM: &str = "__END__";

const RATE_LIMIT_NOTICE: &str =
    "As it is free tier,⚠️ Rate limit exceeded: Too many user requests, please wait a minute.";

/// Seed instruction for every new chat transcript.
const SYSTEM_PROMPT: &str = "\
You are a friendly AI assistant that helps the user chat with their documents. \
If you are asked about yourself, say only that you are an AI assistant here to help. \
The retrieved context is not always needed: the user may be following up on an \
earlier question, so weigh the previous turns of the conversation alongside the \
current context. \
Example: for the question \"what is a CPU?\" with the context \"CPU stands for \
central processing unit\", answer that a CPU is the central processing unit, the \
brain of the computer.";

pub fn chat_routes() -> Router {
    Router::new().route("/api/v1/chat/ws/chat/:pdf_id", get(websocket_handler))
}

/// First frame the client sends after the upgrade.
#[derive(Deserialize)]
struct SessionInit {
    session_id: Uuid,
    #[serde(default)]
    is_legal_doc: bool,
}

fn parse_init(text: &str) -> Option<SessionInit> {
    serde_json::from_str(text).ok()
}

/// One question from the client, with the hash of the document to search.
#[derive(Deserialize)]
struct TurnRequest {
    message: Option<String>,
    pdf_hash: Option<String>,
}

impl TurnRequest {
    fn into_parts(self) -> Option<(String, String)> {
        match (self.message, self.pdf_hash) {
            (Some(message), Some(pdf_hash)) if !message.is_empty() && !pdf_hash.is_empty() => {
                Some((message, pdf_hash))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
enum SessionError {
    #[error("context retrieval failed: {0}")]
    Retrieval(#[from] VectorStoreError),
    #[error("completion stream failed: {0}")]
    Completion(#[from] GeminiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("socket error: {0}")]
    Socket(#[from] axum::Error),
    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(pdf_id): Path<Uuid>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    // Browsers cannot attach an Authorization header to a socket upgrade, so
    // the credential rides in on the session cookie.
    let token = cookie_value(&headers, "access_token");
    ws.on_upgrade(move |socket| websocket(socket, state, pdf_id, token))
}

async fn websocket(mut socket: WebSocket, state: Arc<AppState>, pdf_id: Uuid, token: Option<String>) {
    tracing::info!("🔌 WebSocket connected");

    let Some(token) = token else {
        tracing::warn!("No access token on WebSocket handshake, closing");
        close_with(socket, close_code::POLICY).await;
        return;
    };
    let user_id = match verify_token(&token, &state.settings.jwt_secret)
        .and_then(|claims| claims.sub.parse::<Uuid>().ok())
    {
        Some(id) => id,
        None => {
            tracing::warn!("Invalid access token on WebSocket handshake, closing");
            close_with(socket, close_code::POLICY).await;
            return;
        }
    };

    let init = match socket.recv().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        _ => None,
    };
    let Some(init) = init else {
        tracing::warn!("Bad init payload, closing");
        close_with(socket, close_code::UNSUPPORTED).await;
        return;
    };
    let session_id = init.session_id;
    tracing::info!(
        "💬 Chat session {} opened (legal document: {})",
        session_id,
        init.is_legal_doc
    );

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    state.registry.put(session_id, outbound_tx);
    tracing::debug!("{} live connections", state.registry.len());

    let (mut sender, mut receiver) = socket.split();
    let result = run_session(
        &mut sender,
        &mut receiver,
        &mut outbound_rx,
        &state,
        session_id,
        pdf_id,
        user_id,
    )
    .await;

    // Every exit path, clean or faulted, releases the registry entry.
    state.registry.remove(&session_id);

    match result {
        Ok(()) => tracing::info!("🔌 Disconnected: {}", session_id),
        Err(e) => {
            tracing::error!("WebSocket session {} failed: {}", session_id, e);
            let _ = sender.close().await;
        }
    }
}

async fn close_with(mut socket: WebSocket, code: CloseCode) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: "".into(),
        })))
        .await;
}

async fn run_session(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    state: &AppState,
    session_id: Uuid,
    pdf_id: Uuid,
    user_id: Uuid,
) -> Result<(), SessionError> {
    ensure_session(&state.db_pool, session_id, user_id, pdf_id).await?;

    // Each connection starts from a fresh transcript; prior messages in the
    // session are not replayed into it.
    let mut transcript = Transcript::new(SYSTEM_PROMPT);

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    handle_turn(sender, state, &mut transcript, session_id, &text).await?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SessionError::Socket(e)),
            },
            // Frames pushed through the registry fan out to this client.
            Some(frame) = outbound.recv() => {
                sender.send(frame).await?;
            }
        }
    }
}

async fn handle_turn(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    transcript: &mut Transcript,
    session_id: Uuid,
    text: &str,
) -> Result<(), SessionError> {
    let request: TurnRequest = serde_json::from_str(text)?;
    let Some((question, pdf_hash)) = request.into_parts() else {
        sender
            .send(Message::Text("Missing question or PDF hash.".to_owned()))
            .await?;
        return Ok(());
    };

    let chunks = state
        .qdrant_client
        .relevant_chunks(&question, &pdf_hash, &state.gemini_client)
        .await?;
    let context = chunks.join(" ");

    // Recorded before the rate check; a denied turn still leaves its user
    // entry in the transcript.
    transcript.push_user(format!("{}\n\nContext:\n{}", question, context));

    if !state.rate_limiter.admit() {
        sender.send(Message::Text(RATE_LIMIT_NOTICE.to_owned())).await?;
        sender.send(Message::Text(END_OF_STREAM.to_owned())).await?;
        return Ok(());
    }

    let mut stream = state
        .gemini_client
        .stream_chat_completion(transcript.entries())
        .await?;

    let mut answer = String::new();
    while let Some(token) = stream.next_token().await? {
        answer.push_str(&token);
        sender.send(Message::Text(token)).await?;
    }

    sender.send(Message::Text(END_OF_STREAM.to_owned())).await?;
    transcript.push_assistant(answer.clone());
    persist_turn(&state.db_pool, session_id, &question, &answer).await?;

    Ok(())
}

async fn ensure_session(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    pdf_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO chat_sessions (id, user_id, pdf_id) VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(pdf_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes the user question and the full assistant answer as one atomic pair.
async fn persist_turn(
    pool: &PgPool,
    session_id: Uuid,
    question: &str,
    answer: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO chat_messages (id, session_id, role, content, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(Role::User.as_str())
    .bind(question)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO chat_messages (id, session_id, role, content, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(Role::Assistant.as_str())
    .bind(answer)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_frame_parses_session_id_and_flag() {
        let init = parse_init(
            r#"{"session_id": "11111111-1111-1111-1111-111111111111", "is_legal_doc": true}"#,
        )
        .unwrap();
        assert_eq!(
            init.session_id,
            Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
        );
        assert!(init.is_legal_doc);
    }

    #[test]
    fn test_init_frame_document_flag_defaults_to_false() {
        let init =
            parse_init(r#"{"session_id": "11111111-1111-1111-1111-111111111111"}"#).unwrap();
        assert!(!init.is_legal_doc);
    }

    #[test]
    fn test_init_frame_rejects_bad_payloads() {
        assert!(parse_init("{}").is_none());
        assert!(parse_init(r#"{"session_id": "not-a-uuid"}"#).is_none());
        assert!(parse_init("\"hello\"").is_none());
        assert!(parse_init("not json at all").is_none());
    }

    #[test]
    fn test_turn_request_with_both_fields_is_complete() {
        let request: TurnRequest =
            serde_json::from_str(r#"{"message": "What is a CPU?", "pdf_hash": "abc123"}"#).unwrap();
        assert_eq!(
            request.into_parts(),
            Some(("What is a CPU?".to_owned(), "abc123".to_owned()))
        );
    }

    #[test]
    fn test_turn_request_missing_or_empty_fields_is_incomplete() {
        let missing_hash: TurnRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(missing_hash.into_parts(), None);

        let empty_message: TurnRequest =
            serde_json::from_str(r#"{"message": "", "pdf_hash": "abc123"}"#).unwrap();
        assert_eq!(empty_message.into_parts(), None);

        let empty: TurnRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.into_parts(), None);
    }

    #[test]
    fn test_turn_request_must_be_a_json_object() {
        assert!(serde_json::from_str::<TurnRequest>("\"free text\"").is_err());
        assert!(serde_json::from_str::<TurnRequest>("42").is_err());
    }
}
