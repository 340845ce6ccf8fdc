use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::ConversationKey;
use crate::models::{MediaAttachment, Message};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway upgrade.
/// Tokens are issued elsewhere; this backend only validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Messages --

/// Body of `POST /chat/send` and payload of the gateway `SendMessage` command.
/// `sender_id` must match the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<MediaAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadMessagesResponse {
    /// Newest first.
    pub messages: Vec<Message>,
    /// Pass as `before` to fetch the next, older page. Microseconds since the epoch.
    pub next_cursor: Option<i64>,
    pub has_more: bool,
}

// -- Status --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkDeliveredRequest {
    pub conversation_id: ConversationKey,
    pub message_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkSeenRequest {
    pub conversation_id: ConversationKey,
    pub message_id: Uuid,
}
