//! Expert presence heartbeat
//!
//! While an expert session is open, a fixed-period heartbeat keeps their
//! presence fresh without touching the status they chose (busy stays busy).
//! Stopping the task fires the offline beacon once, fire-and-forget; if the
//! beacon is lost the server-side reaper demotes the expert after the
//! inactivity threshold.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{ApiClient, HEARTBEAT_INTERVAL};

/// Periodic presence heartbeat for one expert session.
pub struct HeartbeatTask {
    api: ApiClient,
    expert_id: Uuid,
    interval: Duration,
}

impl HeartbeatTask {
    pub fn new(api: ApiClient, expert_id: Uuid) -> Self {
        Self::with_interval(api, expert_id, HEARTBEAT_INTERVAL)
    }

    pub fn with_interval(api: ApiClient, expert_id: Uuid, interval: Duration) -> Self {
        Self {
            api,
            expert_id,
            interval,
        }
    }

    /// Launch the heartbeat loop. Tick failures are logged and retried on
    /// the next tick; a few missed beats are exactly what the reaper's
    /// threshold is sized to absorb.
    pub fn start(self) -> HeartbeatHandle {
        let api = self.api.clone();
        let expert_id = self.expert_id;
        let interval = self.interval;

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = api.heartbeat(expert_id).await {
                            warn!(expert_id = %expert_id, error = %e, "Heartbeat failed, retrying next tick");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        HeartbeatHandle {
            api: self.api,
            expert_id: self.expert_id,
            shutdown,
            task,
        }
    }
}

/// Handle to a running heartbeat loop.
pub struct HeartbeatHandle {
    api: ApiClient,
    expert_id: Uuid,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Stop the loop and fire the offline beacon once. Beacon delivery is
    /// best-effort: failures are logged at debug and never retried.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;

        if let Err(e) = self.api.offline_beacon(self.expert_id).await {
            debug!(expert_id = %self.expert_id, error = %e, "Offline beacon lost; reaper will catch up");
        }
    }
}
