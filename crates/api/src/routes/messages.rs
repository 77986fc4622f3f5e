//! Message routes
//!
//! Cursor-based incremental fetch, append, and read receipts. The message
//! surrogate key is the canonical ordering: fetches with the same cursor are
//! idempotent and a caught-up cursor returns nothing.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skinsage_shared::{ConversationStatus, Message, MessageKind, SenderRole};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// Input validation prevents oversized payloads reaching the store
const MAX_BODY_LENGTH: usize = 10_000;

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_role::text AS sender_role, \
     sender_id, body, kind::text AS kind, is_read, sent_at";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FetchMessagesQuery {
    pub conversation_id: Uuid,
    /// Highest message id the client already holds; 0 (or absent) fetches
    /// the full history.
    #[serde(default)]
    pub last_message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub sender_role: SenderRole,
    pub sender_id: Uuid,
    pub body: String,
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub conversation_id: Uuid,
    /// The role doing the reading; messages authored by the opposite role
    /// are flipped.
    pub reader_role: SenderRole,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// Fetch all messages with id greater than the cursor, ascending.
pub async fn fetch_messages(
    State(state): State<AppState>,
    Query(query): Query<FetchMessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages: Vec<Message> = sqlx::query_as(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM messages
        WHERE conversation_id = $1 AND id > $2
        ORDER BY id ASC
        LIMIT $3
        "#,
    ))
    .bind(query.conversation_id)
    .bind(query.last_message_id)
    .bind(state.config.message_fetch_limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(MessagesResponse { messages }))
}

/// Append one message and return it for immediate local display.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<Message>> {
    if req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("Message body cannot be empty".into()));
    }
    if req.body.len() > MAX_BODY_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Message body too long (max {} characters)",
            MAX_BODY_LENGTH
        )));
    }

    // Closed conversations accept no further messages
    let status: Option<(String,)> =
        sqlx::query_as("SELECT status::text FROM conversations WHERE id = $1")
            .bind(req.conversation_id)
            .fetch_optional(&state.pool)
            .await?;

    match status {
        None => return Err(ApiError::NotFound),
        Some((s,)) if s == ConversationStatus::Closed.as_str() => {
            return Err(ApiError::ConversationClosed)
        }
        Some(_) => {}
    }

    let message: Message = sqlx::query_as(&format!(
        r#"
        INSERT INTO messages (conversation_id, sender_role, sender_id, body, kind)
        VALUES ($1, $2::sender_role, $3, $4, $5::message_kind)
        RETURNING {MESSAGE_COLUMNS}
        "#,
    ))
    .bind(req.conversation_id)
    .bind(req.sender_role.as_str())
    .bind(req.sender_id)
    .bind(&req.body)
    .bind(req.kind.as_str())
    .fetch_one(&state.pool)
    .await?;

    // Surface the new activity in both parties' conversation-list polls
    sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
        .bind(req.conversation_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(
        conversation_id = %req.conversation_id,
        message_id = message.id,
        sender_role = req.sender_role.as_str(),
        "Message appended"
    );

    Ok(Json(message))
}

/// Mark every message authored by the opposite role as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<Json<MarkReadResponse>> {
    let authored_by = req.reader_role.opposite();

    let result = sqlx::query(
        r#"
        UPDATE messages
        SET is_read = TRUE
        WHERE conversation_id = $1 AND sender_role = $2::sender_role AND is_read = FALSE
        "#,
    )
    .bind(req.conversation_id)
    .bind(authored_by.as_str())
    .execute(&state.pool)
    .await?;

    Ok(Json(MarkReadResponse {
        marked: result.rows_affected(),
    }))
}
