//! Conversation routes
//!
//! Creating/reusing consultations, the atomic expert accept, closing, and the
//! per-principal conversation lists.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use skinsage_shared::{Conversation, ConversationStatus, ConversationSummary, ExpertStatus};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub customer_id: Uuid,
    /// Targeted consultation when set; quick consultation when omitted.
    pub expert_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptConversationRequest {
    pub expert_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub customer_id: Option<Uuid>,
    pub expert_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct WaitingListResponse {
    pub conversations: Vec<Conversation>,
}

const CONVERSATION_COLUMNS: &str =
    "id, customer_id, expert_id, status::text AS status, created_at, updated_at";

// =============================================================================
// Helper Functions
// =============================================================================

/// A conversation may only be bound to an expert who is currently active.
async fn require_active_expert(pool: &PgPool, expert_id: Uuid) -> ApiResult<()> {
    let status: Option<(String,)> =
        sqlx::query_as("SELECT status::text FROM experts WHERE id = $1")
            .bind(expert_id)
            .fetch_optional(pool)
            .await?;

    match status {
        None => Err(ApiError::NotFound),
        Some((s,)) if s == ExpertStatus::Active.as_str() => Ok(()),
        Some(_) => Err(ApiError::ExpertUnavailable),
    }
}

async fn find_unassigned_waiting(
    pool: &PgPool,
    customer_id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM conversations
        WHERE customer_id = $1 AND status = 'waiting' AND expert_id IS NULL
        "#,
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a consultation, or return the existing one unchanged.
///
/// Targeted requests reuse any non-closed conversation for the
/// (customer, expert) pair; quick consultations reuse the customer's
/// unassigned waiting conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    match req.expert_id {
        Some(expert_id) => {
            create_targeted(&state.pool, req.customer_id, expert_id).await
        }
        None => create_quick(&state.pool, req.customer_id).await,
    }
    .map(Json)
}

async fn create_targeted(
    pool: &PgPool,
    customer_id: Uuid,
    expert_id: Uuid,
) -> ApiResult<Conversation> {
    // Idempotent reuse: repeatedly targeting the same expert must not fan
    // out into duplicate conversations.
    let existing: Option<Conversation> = sqlx::query_as(&format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM conversations
        WHERE customer_id = $1 AND expert_id = $2 AND status != 'closed'
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    ))
    .bind(customer_id)
    .bind(expert_id)
    .fetch_optional(pool)
    .await?;

    if let Some(conversation) = existing {
        return Ok(conversation);
    }

    require_active_expert(pool, expert_id).await?;

    // The target was confirmed active, so the conversation is created
    // already bound (status 'active' requires expert_id by constraint).
    let conversation: Conversation = sqlx::query_as(&format!(
        r#"
        INSERT INTO conversations (customer_id, expert_id, status)
        VALUES ($1, $2, 'active')
        RETURNING {CONVERSATION_COLUMNS}
        "#,
    ))
    .bind(customer_id)
    .bind(expert_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        conversation_id = %conversation.id,
        customer_id = %customer_id,
        expert_id = %expert_id,
        "Targeted consultation created"
    );

    Ok(conversation)
}

async fn create_quick(pool: &PgPool, customer_id: Uuid) -> ApiResult<Conversation> {
    if let Some(conversation) = find_unassigned_waiting(pool, customer_id).await? {
        return Ok(conversation);
    }

    let inserted: Result<Conversation, sqlx::Error> = sqlx::query_as(&format!(
        r#"
        INSERT INTO conversations (customer_id, status)
        VALUES ($1, 'waiting')
        RETURNING {CONVERSATION_COLUMNS}
        "#,
    ))
    .bind(customer_id)
    .fetch_one(pool)
    .await;

    let conversation = match inserted {
        Ok(conversation) => conversation,
        // Unique violation on the partial index: a concurrent request for
        // the same customer won the insert. Return the winner's row.
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
            find_unassigned_waiting(pool, customer_id)
                .await?
                .ok_or(ApiError::Internal)?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        conversation_id = %conversation.id,
        customer_id = %customer_id,
        "Quick consultation waiting for an expert"
    );

    Ok(conversation)
}

/// Accept a waiting conversation.
///
/// The guard (`status = 'waiting' AND expert_id IS NULL`) is evaluated
/// atomically by the store: of any number of racing accepts exactly one
/// updates a row, the rest fall through to `ALREADY_ASSIGNED`.
pub async fn accept_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<AcceptConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    require_active_expert(&state.pool, req.expert_id).await?;

    let accepted: Option<Conversation> = sqlx::query_as(&format!(
        r#"
        UPDATE conversations
        SET expert_id = $2, status = 'active', updated_at = NOW()
        WHERE id = $1 AND status = 'waiting' AND expert_id IS NULL
        RETURNING {CONVERSATION_COLUMNS}
        "#,
    ))
    .bind(conversation_id)
    .bind(req.expert_id)
    .fetch_optional(&state.pool)
    .await?;

    let conversation = match accepted {
        Some(conversation) => conversation,
        None => {
            // Guard failed: distinguish "lost the race" from "gone".
            let status: Option<(String,)> =
                sqlx::query_as("SELECT status::text FROM conversations WHERE id = $1")
                    .bind(conversation_id)
                    .fetch_optional(&state.pool)
                    .await?;

            return match status {
                None => Err(ApiError::NotFound),
                Some((s,)) if s == ConversationStatus::Closed.as_str() => {
                    Err(ApiError::ConversationClosed)
                }
                Some(_) => Err(ApiError::AlreadyAssigned),
            };
        }
    };

    tracing::info!(
        conversation_id = %conversation_id,
        expert_id = %req.expert_id,
        "Expert accepted consultation"
    );

    Ok(Json(conversation))
}

/// Close a conversation. Terminal; repeat closes are a no-op.
pub async fn close_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    let conversation: Conversation = sqlx::query_as(&format!(
        r#"
        UPDATE conversations
        SET status = 'closed', updated_at = NOW()
        WHERE id = $1
        RETURNING {CONVERSATION_COLUMNS}
        "#,
    ))
    .bind(conversation_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    tracing::info!(conversation_id = %conversation_id, "Consultation closed");

    Ok(Json(conversation))
}

/// List conversations for one principal, most recently updated first.
///
/// Each row carries the derived unread count: messages authored by the
/// opposite role that the requesting role has not read yet.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<ConversationsListResponse>> {
    let conversations: Vec<ConversationSummary> = match (query.customer_id, query.expert_id) {
        (Some(customer_id), None) => {
            sqlx::query_as(
                r#"
                SELECT c.id, c.customer_id, c.expert_id, c.status::text AS status,
                       c.created_at, c.updated_at,
                       COALESCE((SELECT COUNT(*) FROM messages m
                                 WHERE m.conversation_id = c.id
                                   AND m.sender_role = 'expert'
                                   AND m.is_read = FALSE), 0) AS unread_count
                FROM conversations c
                WHERE c.customer_id = $1
                ORDER BY c.updated_at DESC
                "#,
            )
            .bind(customer_id)
            .fetch_all(&state.pool)
            .await?
        }
        (None, Some(expert_id)) => {
            sqlx::query_as(
                r#"
                SELECT c.id, c.customer_id, c.expert_id, c.status::text AS status,
                       c.created_at, c.updated_at,
                       COALESCE((SELECT COUNT(*) FROM messages m
                                 WHERE m.conversation_id = c.id
                                   AND m.sender_role = 'customer'
                                   AND m.is_read = FALSE), 0) AS unread_count
                FROM conversations c
                WHERE c.expert_id = $1
                ORDER BY c.updated_at DESC
                "#,
            )
            .bind(expert_id)
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Exactly one of customer_id or expert_id is required".into(),
            ))
        }
    };

    Ok(Json(ConversationsListResponse { conversations }))
}

/// Unassigned waiting conversations, oldest first.
///
/// The queue every active expert polls; the longest-waiting customer is
/// offered first. Accept races on the same row are resolved by the guard in
/// [`accept_conversation`].
pub async fn list_waiting(
    State(state): State<AppState>,
) -> ApiResult<Json<WaitingListResponse>> {
    let conversations: Vec<Conversation> = sqlx::query_as(&format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM conversations
        WHERE status = 'waiting' AND expert_id IS NULL
        ORDER BY created_at ASC
        "#,
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(WaitingListResponse { conversations }))
}
