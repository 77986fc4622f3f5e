//! Presence Reaper
//!
//! Demotes experts whose heartbeat went silent to offline. The explicit
//! "go offline" beacon on page close is fire-and-forget and may never arrive;
//! this sweep is the correctness backstop that bounds how long a dead session
//! can look available.

use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

/// Sweep all active/busy experts whose last activity is older than
/// `stale_after` and force them offline.
///
/// Concurrent heartbeats arriving mid-sweep are fine: a refreshed
/// `last_activity` simply keeps that row out of the predicate (last write
/// wins). Errors are logged and swallowed so one failed sweep never takes
/// the worker down.
pub async fn sweep_stale_experts(pool: &PgPool, stale_after: Duration) {
    let result = sqlx::query(
        r#"
        UPDATE experts
        SET status = 'offline'
        WHERE status IN ('active', 'busy')
          AND last_activity < NOW() - make_interval(secs => $1)
        "#,
    )
    .bind(stale_after.as_secs_f64())
    .execute(pool)
    .await;

    match result {
        Ok(done) => {
            let reaped = done.rows_affected();
            if reaped > 0 {
                info!(reaped, "Stale experts forced offline");
            }
        }
        Err(e) => {
            error!(error = %e, "Presence sweep failed");
        }
    }
}
