//! Message Sync Engine
//!
//! Keeps a local copy of one conversation's append-only message log in step
//! with the server using a monotonic cursor: fetch everything above the
//! highest id held, merge by id-based set difference, repeat. Overlapping
//! fetches are harmless by construction — a duplicate id is dropped in the
//! merge, never appended twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::warn;
use uuid::Uuid;

use skinsage_shared::{Message, MessageKind};

use crate::api::{ApiClient, SessionContext, MESSAGE_POLL_INTERVAL};
use crate::error::{ClientError, ClientResult};

// =============================================================================
// Local buffer
// =============================================================================

/// Local, id-unique, ascending view of a conversation's message log.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    messages: Vec<Message>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sync cursor: highest message id held locally, 0 when empty.
    pub fn cursor(&self) -> i64 {
        self.messages.last().map(|m| m.id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Full replacement, used for the initial load.
    pub fn replace(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);
        self.messages = messages;
    }

    /// Merge a fetched batch by id-based set difference. Returns how many
    /// messages were actually new.
    pub fn merge(&mut self, fetched: Vec<Message>) -> usize {
        let mut seen: HashSet<i64> = self.messages.iter().map(|m| m.id).collect();
        let before = self.messages.len();
        for message in fetched {
            if seen.insert(message.id) {
                self.messages.push(message);
            }
        }
        let added = self.messages.len() - before;
        if added > 0 {
            self.messages.sort_by_key(|m| m.id);
        }
        added
    }
}

// =============================================================================
// Poll loop
// =============================================================================

/// Handle to a running polling task. Dropping it without [`stop`] leaves the
/// task running until the process exits; switching conversations should stop
/// the old handle first.
///
/// [`stop`]: SyncHandle::stop
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub(crate) fn from_parts(shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { shutdown, task }
    }

    /// Cancel the loop and wait for the in-flight tick, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Backoff for the initial load: 100ms, 200ms, 400ms, then give up and
/// surface the error (poll ticks have their own retry-next-tick behavior).
pub(crate) fn initial_load_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(50)
        .max_delay(Duration::from_secs(2))
        .take(3)
}

/// Per-conversation sync controller.
///
/// One instance per open conversation view. `open` performs the initial full
/// fetch; `start` launches the incremental poll loop; `stop` on the returned
/// handle ends it. A session switching conversations stops the old loop and
/// opens a new controller with a fresh cursor.
pub struct ConversationSync {
    api: ApiClient,
    ctx: SessionContext,
    conversation_id: Uuid,
    poll_interval: Duration,
    buffer: Arc<RwLock<MessageBuffer>>,
}

impl ConversationSync {
    /// Open a conversation: fetch the full history (cursor 0), replace the
    /// buffer, and mark the other side's messages read.
    ///
    /// Unlike poll ticks, a failure here is surfaced to the caller once the
    /// backoff retries are exhausted — the user is staring at an empty view.
    pub async fn open(
        api: ApiClient,
        ctx: SessionContext,
        conversation_id: Uuid,
    ) -> ClientResult<Self> {
        Self::open_with_interval(api, ctx, conversation_id, MESSAGE_POLL_INTERVAL).await
    }

    pub async fn open_with_interval(
        api: ApiClient,
        ctx: SessionContext,
        conversation_id: Uuid,
        poll_interval: Duration,
    ) -> ClientResult<Self> {
        let messages = RetryIf::spawn(
            initial_load_backoff(),
            || api.fetch_messages_since(conversation_id, 0),
            |err: &ClientError| err.is_transient(),
        )
        .await?;

        let got_messages = !messages.is_empty();
        let mut buffer = MessageBuffer::new();
        buffer.replace(messages);

        let sync = Self {
            api,
            ctx,
            conversation_id,
            poll_interval,
            buffer: Arc::new(RwLock::new(buffer)),
        };

        if got_messages {
            sync.mark_read_best_effort().await;
        }

        Ok(sync)
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.buffer.read().await.snapshot()
    }

    pub async fn cursor(&self) -> i64 {
        self.buffer.read().await.cursor()
    }

    /// Send a message and merge the returned row immediately, so the sender
    /// sees it without waiting for the next poll. The merge also means the
    /// next fetch returning the same row is dropped as a duplicate.
    pub async fn send(&self, body: &str, kind: MessageKind) -> ClientResult<Message> {
        let message = self
            .api
            .send_message(self.conversation_id, &self.ctx, body, kind)
            .await?;
        self.buffer.write().await.merge(vec![message.clone()]);
        Ok(message)
    }

    /// Launch the incremental poll loop.
    ///
    /// The tick body awaits its fetch before the next tick can fire
    /// (`MissedTickBehavior::Delay`), so a slow response never overlaps the
    /// following one. Tick failures are logged and absorbed; the next tick
    /// retries from the same cursor.
    pub fn start(&self) -> SyncHandle {
        let api = self.api.clone();
        let ctx = self.ctx;
        let conversation_id = self.conversation_id;
        let buffer = Arc::clone(&self.buffer);
        let poll_interval = self.poll_interval;

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let cursor = buffer.read().await.cursor();
                        match api.fetch_messages_since(conversation_id, cursor).await {
                            Ok(fetched) => {
                                if fetched.is_empty() {
                                    continue;
                                }
                                let added = buffer.write().await.merge(fetched);
                                if added > 0 {
                                    if let Err(e) = api.mark_read(conversation_id, ctx.role).await {
                                        warn!(
                                            conversation_id = %conversation_id,
                                            error = %e,
                                            "Mark-read failed, next fetch will retry"
                                        );
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(
                                    conversation_id = %conversation_id,
                                    error = %e,
                                    "Message poll failed, retrying next tick"
                                );
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

        SyncHandle { shutdown, task }
    }

    async fn mark_read_best_effort(&self) {
        if let Err(e) = self
            .api
            .mark_read(self.conversation_id, self.ctx.role)
            .await
        {
            warn!(
                conversation_id = %self.conversation_id,
                error = %e,
                "Mark-read failed, next fetch will retry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn message(id: i64, conversation_id: Uuid) -> Message {
        Message {
            id,
            conversation_id,
            sender_role: "expert".to_string(),
            sender_id: Uuid::new_v4(),
            body: format!("message {id}"),
            kind: "text".to_string(),
            is_read: false,
            sent_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn empty_buffer_has_zero_cursor() {
        let buffer = MessageBuffer::new();
        assert_eq!(buffer.cursor(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn merge_of_overlapping_fetches_drops_duplicates() {
        let conversation_id = Uuid::new_v4();
        let mut buffer = MessageBuffer::new();

        buffer.replace(vec![
            message(1, conversation_id),
            message(2, conversation_id),
            message(3, conversation_id),
        ]);
        assert_eq!(buffer.cursor(), 3);

        // Overlap: ids 2 and 3 are already held
        let added = buffer.merge(vec![
            message(2, conversation_id),
            message(3, conversation_id),
            message(4, conversation_id),
            message(5, conversation_id),
        ]);
        assert_eq!(added, 2);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.cursor(), 5);

        let ids: Vec<i64> = buffer.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn merge_is_idempotent() {
        let conversation_id = Uuid::new_v4();
        let mut buffer = MessageBuffer::new();

        let batch = vec![message(10, conversation_id), message(11, conversation_id)];
        assert_eq!(buffer.merge(batch.clone()), 2);
        assert_eq!(buffer.merge(batch), 0);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn merge_of_empty_fetch_is_a_noop() {
        let conversation_id = Uuid::new_v4();
        let mut buffer = MessageBuffer::new();
        buffer.replace(vec![message(7, conversation_id)]);

        assert_eq!(buffer.merge(Vec::new()), 0);
        assert_eq!(buffer.cursor(), 7);
    }

    #[test]
    fn merge_dedups_within_a_single_batch() {
        let conversation_id = Uuid::new_v4();
        let mut buffer = MessageBuffer::new();

        let added = buffer.merge(vec![
            message(1, conversation_id),
            message(1, conversation_id),
            message(2, conversation_id),
        ]);
        assert_eq!(added, 2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn out_of_order_batches_restore_ascending_order() {
        let conversation_id = Uuid::new_v4();
        let mut buffer = MessageBuffer::new();

        buffer.merge(vec![message(5, conversation_id), message(3, conversation_id)]);
        buffer.merge(vec![message(4, conversation_id)]);

        let ids: Vec<i64> = buffer.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(buffer.cursor(), 5);
    }
}
