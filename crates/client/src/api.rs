//! Typed HTTP client for the consultation API
//!
//! One request/response per call, no connection state beyond reqwest's pool.
//! Identity is never read from ambient storage: every session constructs a
//! [`SessionContext`] once and passes it into the controllers explicitly.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use skinsage_shared::{
    Conversation, ConversationSummary, ExpertPresence, ExpertStatus, Message, MessageKind,
    SenderRole,
};

use crate::error::{ClientError, ClientResult};

/// Timeout for a single API request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll cadence for the open conversation's message log
pub const MESSAGE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll cadence for the conversation list
pub const CONVERSATION_LIST_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Cadence of the expert presence heartbeat
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// The authenticated principal driving this session.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub role: SenderRole,
    pub principal_id: Uuid,
}

impl SessionContext {
    pub fn customer(customer_id: Uuid) -> Self {
        Self {
            role: SenderRole::Customer,
            principal_id: customer_id,
        }
    }

    pub fn expert(expert_id: Uuid) -> Self {
        Self {
            role: SenderRole::Expert,
            principal_id: expert_id,
        }
    }
}

// =============================================================================
// Response envelopes
// =============================================================================

#[derive(Debug, Deserialize)]
struct ConversationsListResponse {
    conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
struct WaitingListResponse {
    conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct MarkReadResponse {
    marked: u64,
}

#[derive(Debug, Deserialize)]
struct ActiveExpertsResponse {
    experts: Vec<ExpertPresence>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[allow(dead_code)]
    code: String,
    message: String,
}

// =============================================================================
// Client
// =============================================================================

/// Client for the consultation API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url: String = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn read_response<T: DeserializeOwned>(resp: reqwest::Response) -> ClientResult<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    // -------------------------------------------------------------------------
    // Conversation resource
    // -------------------------------------------------------------------------

    /// Create-or-reuse a consultation. Omit `expert_id` for a quick
    /// consultation visible to all active experts.
    pub async fn start_conversation(
        &self,
        customer_id: Uuid,
        expert_id: Option<Uuid>,
    ) -> ClientResult<Conversation> {
        let resp = self
            .http
            .post(self.url("/conversations"))
            .json(&json!({ "customer_id": customer_id, "expert_id": expert_id }))
            .send()
            .await?;
        Self::read_response(resp).await
    }

    /// Attempt the atomic accept. Losing the race surfaces as an
    /// [`ClientError::Api`] with status 409.
    pub async fn accept_conversation(
        &self,
        conversation_id: Uuid,
        expert_id: Uuid,
    ) -> ClientResult<Conversation> {
        let resp = self
            .http
            .put(self.url(&format!("/conversations/{conversation_id}/accept")))
            .json(&json!({ "expert_id": expert_id }))
            .send()
            .await?;
        Self::read_response(resp).await
    }

    pub async fn close_conversation(&self, conversation_id: Uuid) -> ClientResult<Conversation> {
        let resp = self
            .http
            .post(self.url(&format!("/conversations/{conversation_id}/close")))
            .send()
            .await?;
        Self::read_response(resp).await
    }

    /// This principal's conversations with derived unread counts.
    pub async fn list_conversations(
        &self,
        ctx: &SessionContext,
    ) -> ClientResult<Vec<ConversationSummary>> {
        let param = match ctx.role {
            SenderRole::Customer => "customer_id",
            SenderRole::Expert => "expert_id",
        };
        let resp = self
            .http
            .get(self.url("/conversations"))
            .query(&[(param, ctx.principal_id.to_string())])
            .send()
            .await?;
        let body: ConversationsListResponse = Self::read_response(resp).await?;
        Ok(body.conversations)
    }

    /// The unassigned waiting queue, oldest first.
    pub async fn list_waiting(&self) -> ClientResult<Vec<Conversation>> {
        let resp = self
            .http
            .get(self.url("/conversations/waiting"))
            .send()
            .await?;
        let body: WaitingListResponse = Self::read_response(resp).await?;
        Ok(body.conversations)
    }

    // -------------------------------------------------------------------------
    // Message resource
    // -------------------------------------------------------------------------

    /// All messages with id greater than `last_message_id`, ascending.
    /// Safe to repeat with the same cursor.
    pub async fn fetch_messages_since(
        &self,
        conversation_id: Uuid,
        last_message_id: i64,
    ) -> ClientResult<Vec<Message>> {
        let resp = self
            .http
            .get(self.url("/messages"))
            .query(&[
                ("conversation_id", conversation_id.to_string()),
                ("last_message_id", last_message_id.to_string()),
            ])
            .send()
            .await?;
        let body: MessagesResponse = Self::read_response(resp).await?;
        Ok(body.messages)
    }

    /// Append one message; the created row comes back for immediate local
    /// display.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        ctx: &SessionContext,
        body: &str,
        kind: MessageKind,
    ) -> ClientResult<Message> {
        let resp = self
            .http
            .post(self.url("/messages"))
            .json(&json!({
                "conversation_id": conversation_id,
                "sender_role": ctx.role,
                "sender_id": ctx.principal_id,
                "body": body,
                "kind": kind,
            }))
            .send()
            .await?;
        Self::read_response(resp).await
    }

    /// Mark everything the opposite role wrote in this conversation as read.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_role: SenderRole,
    ) -> ClientResult<u64> {
        let resp = self
            .http
            .put(self.url("/messages/read"))
            .json(&json!({
                "conversation_id": conversation_id,
                "reader_role": reader_role,
            }))
            .send()
            .await?;
        let body: MarkReadResponse = Self::read_response(resp).await?;
        Ok(body.marked)
    }

    // -------------------------------------------------------------------------
    // Presence resource
    // -------------------------------------------------------------------------

    pub async fn set_status(
        &self,
        expert_id: Uuid,
        display_name: Option<&str>,
        status: ExpertStatus,
    ) -> ClientResult<ExpertPresence> {
        let resp = self
            .http
            .put(self.url("/presence"))
            .json(&json!({
                "expert_id": expert_id,
                "display_name": display_name,
                "status": status,
            }))
            .send()
            .await?;
        Self::read_response(resp).await
    }

    /// Refresh presence freshness; the server preserves the chosen status.
    pub async fn heartbeat(&self, expert_id: Uuid) -> ClientResult<ExpertPresence> {
        let resp = self
            .http
            .post(self.url("/presence/heartbeat"))
            .json(&json!({ "expert_id": expert_id }))
            .send()
            .await?;
        Self::read_response(resp).await
    }

    /// The teardown beacon. Callers treat this as fire-and-forget: errors
    /// are ignored and nothing retries (the reaper covers lost beacons).
    pub async fn offline_beacon(&self, expert_id: Uuid) -> ClientResult<()> {
        let resp = self
            .http
            .post(self.url("/presence/offline"))
            .json(&json!({ "expert_id": expert_id }))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Api {
                status: resp.status().as_u16(),
                message: "offline beacon rejected".to_string(),
            })
        }
    }

    /// Experts a customer may target right now.
    pub async fn list_active_experts(&self) -> ClientResult<Vec<ExpertPresence>> {
        let resp = self.http.get(self.url("/experts/active")).send().await?;
        let body: ActiveExpertsResponse = Self::read_response(resp).await?;
        Ok(body.experts)
    }
}
