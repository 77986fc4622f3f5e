//! SkinSage consultation client
//!
//! The client-side half of the pull-based consultation design: a typed API
//! client plus the polling controllers a customer or expert session runs —
//! the per-conversation message sync loop, the conversation-list poll, and
//! the expert presence heartbeat. There is no push transport; every loop is
//! an independent cancellable task whose reads are idempotent.

pub mod api;
pub mod conversations;
pub mod error;
pub mod heartbeat;
pub mod sync;

pub use api::{
    ApiClient, SessionContext, CONVERSATION_LIST_POLL_INTERVAL, HEARTBEAT_INTERVAL,
    MESSAGE_POLL_INTERVAL,
};
pub use conversations::ConversationListSync;
pub use error::{ClientError, ClientResult};
pub use heartbeat::{HeartbeatHandle, HeartbeatTask};
pub use sync::{ConversationSync, MessageBuffer, SyncHandle};
