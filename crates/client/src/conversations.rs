//! Conversation-list polling
//!
//! The slower sibling of the message sync loop: keeps one principal's
//! conversation list (and its unread badge counts) fresh while their inbox
//! view is open. The list is a full snapshot each tick, so replacement —
//! not merging — is the right move here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_retry::RetryIf;
use tracing::warn;

use skinsage_shared::ConversationSummary;

use crate::api::{ApiClient, SessionContext, CONVERSATION_LIST_POLL_INTERVAL};
use crate::error::{ClientError, ClientResult};
use crate::sync::SyncHandle;

/// Polling controller for one principal's conversation list.
pub struct ConversationListSync {
    api: ApiClient,
    ctx: SessionContext,
    poll_interval: Duration,
    conversations: Arc<RwLock<Vec<ConversationSummary>>>,
}

impl ConversationListSync {
    /// Fetch the initial list (failure is surfaced — the inbox has nothing
    /// to show) and build the controller.
    pub async fn open(api: ApiClient, ctx: SessionContext) -> ClientResult<Self> {
        Self::open_with_interval(api, ctx, CONVERSATION_LIST_POLL_INTERVAL).await
    }

    pub async fn open_with_interval(
        api: ApiClient,
        ctx: SessionContext,
        poll_interval: Duration,
    ) -> ClientResult<Self> {
        let initial = RetryIf::spawn(
            crate::sync::initial_load_backoff(),
            || api.list_conversations(&ctx),
            |err: &ClientError| err.is_transient(),
        )
        .await?;

        Ok(Self {
            api,
            ctx,
            poll_interval,
            conversations: Arc::new(RwLock::new(initial)),
        })
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations.read().await.clone()
    }

    /// Total unread badge across all conversations.
    pub async fn unread_total(&self) -> i64 {
        self.conversations
            .read()
            .await
            .iter()
            .map(|c| c.unread_count)
            .sum()
    }

    /// Launch the list poll loop; same lifecycle rules as the message loop.
    pub fn start(&self) -> SyncHandle {
        let api = self.api.clone();
        let ctx = self.ctx;
        let conversations = Arc::clone(&self.conversations);
        let poll_interval = self.poll_interval;

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match api.list_conversations(&ctx).await {
                            Ok(fresh) => {
                                *conversations.write().await = fresh;
                            }
                            Err(e) => {
                                warn!(error = %e, "Conversation list poll failed, retrying next tick");
                            }
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

        SyncHandle::from_parts(shutdown, task)
    }
}
