use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::SendMessageRequest;
use crate::identity::ConversationKey;
use crate::models::Message;

/// Events pushed over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is bound to `user_id`
    Ready { user_id: Uuid },

    /// A message was stored in one of the user's conversations
    ReceiveMessage(Message),

    /// The other participant is typing
    TypingStarted {
        sender_id: Uuid,
        conversation_id: ConversationKey,
    },

    MessageDelivered {
        message_id: Uuid,
        conversation_id: ConversationKey,
    },

    MessageSeen {
        message_id: Uuid,
        conversation_id: ConversationKey,
    },

    /// A command from this connection failed
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    SendMessage(SendMessageRequest),

    Typing { receiver_id: Uuid },

    MarkDelivered {
        conversation_id: ConversationKey,
        message_id: Uuid,
        other_participant_id: Uuid,
    },

    MarkSeen {
        conversation_id: ConversationKey,
        message_id: Uuid,
        other_participant_id: Uuid,
    },
}
