use tracing::trace;
use uuid::Uuid;

use seamless_types::ConversationKey;
use seamless_types::events::GatewayEvent;
use seamless_types::models::Message;

use crate::presence::PresenceRegistry;

/// Pushes chat events to live connections. Delivery is best-effort: callers
/// invoke it only after the durable write, and a user with no live
/// connection simply misses the push and catches up by paginating.
#[derive(Clone, Default)]
pub struct RealtimeBroadcaster {
    presence: PresenceRegistry,
}

impl RealtimeBroadcaster {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Both sides get the message; the sender's other devices see their own echo.
    pub async fn notify_new_message(&self, message: &Message) -> usize {
        let event = GatewayEvent::ReceiveMessage(message.clone());
        let reached = self.presence.send_to_user(message.receiver_id, &event).await
            + self.presence.send_to_user(message.sender_id, &event).await;

        trace!("Message {} pushed to {} connections", message.message_id, reached);
        reached
    }

    pub async fn notify_typing(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        conversation_id: &ConversationKey,
    ) -> usize {
        let event = GatewayEvent::TypingStarted {
            sender_id,
            conversation_id: conversation_id.clone(),
        };
        self.presence.send_to_user(receiver_id, &event).await
    }

    pub async fn notify_delivered(
        &self,
        message_id: Uuid,
        conversation_id: &ConversationKey,
        other_participant_id: Uuid,
    ) -> usize {
        let event = GatewayEvent::MessageDelivered {
            message_id,
            conversation_id: conversation_id.clone(),
        };
        self.presence.send_to_user(other_participant_id, &event).await
    }

    pub async fn notify_seen(
        &self,
        message_id: Uuid,
        conversation_id: &ConversationKey,
        other_participant_id: Uuid,
    ) -> usize {
        let event = GatewayEvent::MessageSeen {
            message_id,
            conversation_id: conversation_id.clone(),
        };
        self.presence.send_to_user(other_participant_id, &event).await
    }
}
