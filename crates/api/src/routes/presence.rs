//! Expert presence routes
//!
//! Status set/upsert, the periodic heartbeat, the teardown beacon, and the
//! customer-facing directory of active experts. The background reaper (in the
//! worker binary) is the backstop for sessions that never say goodbye.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skinsage_shared::{ExpertPresence, ExpertStatus};

use crate::{error::ApiResult, state::AppState};

const EXPERT_COLUMNS: &str = "id, display_name, status::text AS status, last_activity";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub expert_id: Uuid,
    /// Supplied on login; preserved on later status toggles when omitted.
    pub display_name: Option<String>,
    pub status: ExpertStatus,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub expert_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct OfflineBeaconRequest {
    pub expert_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ActiveExpertsResponse {
    pub experts: Vec<ExpertPresence>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Set an expert's availability, stamping activity now.
///
/// Login forces `active`, manual toggles set `active`/`busy`, logout sets
/// `offline`. The row is upserted so first login needs no prior registration.
pub async fn set_status(
    State(state): State<AppState>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<Json<ExpertPresence>> {
    let expert: ExpertPresence = sqlx::query_as(&format!(
        r#"
        INSERT INTO experts (id, display_name, status, last_activity)
        VALUES ($1, COALESCE($2, ''), $3::expert_status, NOW())
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            display_name = COALESCE($2, experts.display_name),
            last_activity = NOW()
        RETURNING {EXPERT_COLUMNS}
        "#,
    ))
    .bind(req.expert_id)
    .bind(&req.display_name)
    .bind(req.status.as_str())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        expert_id = %req.expert_id,
        status = req.status.as_str(),
        "Expert status set"
    );

    Ok(Json(expert))
}

/// Refresh presence freshness without touching the chosen status.
///
/// A deliberately-set `busy` must never be silently promoted back to
/// `active` by the session timer.
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<ExpertPresence>> {
    let expert: ExpertPresence = sqlx::query_as(&format!(
        r#"
        UPDATE experts
        SET last_activity = NOW()
        WHERE id = $1
        RETURNING {EXPERT_COLUMNS}
        "#,
    ))
    .bind(req.expert_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(crate::error::ApiError::NotFound)?;

    Ok(Json(expert))
}

/// Best-effort offline signal fired from page/tab teardown.
///
/// Delivery is not guaranteed and the client never retries; the reaper
/// covers the case where this beacon is lost. Unknown experts are ignored so
/// a stale tab cannot produce errors.
pub async fn offline_beacon(
    State(state): State<AppState>,
    Json(req): Json<OfflineBeaconRequest>,
) -> ApiResult<StatusCode> {
    sqlx::query("UPDATE experts SET status = 'offline', last_activity = NOW() WHERE id = $1")
        .bind(req.expert_id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Experts currently available for direct targeting or quick-consultation
/// assignment.
pub async fn list_active_experts(
    State(state): State<AppState>,
) -> ApiResult<Json<ActiveExpertsResponse>> {
    let experts: Vec<ExpertPresence> = sqlx::query_as(&format!(
        r#"
        SELECT {EXPERT_COLUMNS}
        FROM experts
        WHERE status = 'active'
        ORDER BY display_name ASC
        "#,
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ActiveExpertsResponse { experts }))
}
