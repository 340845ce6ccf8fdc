use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::ConversationKey;
use crate::status::{MessageStatus, Transition, TransitionError};

/// Preview shown in the inbox for messages that carry only an attachment.
pub const MEDIA_PREVIEW: &str = "[media]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Unknown => "unknown",
        }
    }

    /// Unrecognised tags map to `Unknown` instead of failing the row.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Unknown,
        }
    }
}

/// Media is referenced by URL; bytes never pass through the chat backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub media_kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: ConversationKey,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub last_message_text: Option<String>,
    pub last_message_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh conversation with an empty preview.
    pub fn new(conversation_id: ConversationKey, created_at: DateTime<Utc>) -> Self {
        let (user1_id, user2_id) = conversation_id.participants();
        Self {
            conversation_id,
            user1_id,
            user2_id,
            last_message_text: None,
            last_message_at: created_at,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub conversation_id: ConversationKey,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub attachment: Option<MediaAttachment>,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        conversation_id: ConversationKey,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: Option<String>,
        attachment: Option<MediaAttachment>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            receiver_id,
            content,
            attachment,
            status: MessageStatus::Sent,
            sent_at,
            delivered_at: None,
            seen_at: None,
        }
    }

    pub fn preview_text(&self) -> &str {
        self.content.as_deref().unwrap_or(MEDIA_PREVIEW)
    }

    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> Result<Transition, TransitionError> {
        let transition = self.status.transition(MessageStatus::Delivered)?;
        if transition == Transition::Advanced {
            self.status = MessageStatus::Delivered;
            self.delivered_at = Some(at);
        }
        Ok(transition)
    }

    /// Seen implies delivered: a message seen straight from `Sent` gets both
    /// timestamps, and `seen_at` never precedes `delivered_at`.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) -> Result<Transition, TransitionError> {
        let transition = self.status.transition(MessageStatus::Seen)?;
        if transition == Transition::Advanced {
            let delivered_at = *self.delivered_at.get_or_insert(at);
            self.status = MessageStatus::Seen;
            self.seen_at = Some(at.max(delivered_at));
        }
        Ok(transition)
    }
}

/// One row of a user's inbox: a conversation seen from `viewer`'s side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub conversation_id: ConversationKey,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub other_participant_id: Uuid,
    pub last_message_text: Option<String>,
    pub last_message_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message() -> Message {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let key = ConversationKey::resolve(a, b).unwrap();
        Message::new(key, a, b, Some("hello".into()), None, Utc::now())
    }

    #[test]
    fn delivered_then_seen_keeps_both_timestamps() {
        let mut msg = message();
        let t0 = msg.sent_at + Duration::seconds(1);
        let t1 = t0 + Duration::seconds(1);

        assert_eq!(msg.mark_delivered(t0), Ok(Transition::Advanced));
        assert_eq!(msg.mark_seen(t1), Ok(Transition::Advanced));

        assert_eq!(msg.status, MessageStatus::Seen);
        assert_eq!(msg.delivered_at, Some(t0));
        assert_eq!(msg.seen_at, Some(t1));
    }

    #[test]
    fn seen_from_sent_backfills_delivered() {
        let mut msg = message();
        let t = msg.sent_at + Duration::seconds(3);

        msg.mark_seen(t).unwrap();
        assert_eq!(msg.delivered_at, Some(t));
        assert_eq!(msg.seen_at, Some(t));
    }

    #[test]
    fn delivered_after_seen_is_rejected_and_state_kept() {
        let mut msg = message();
        let t = msg.sent_at + Duration::seconds(1);
        msg.mark_seen(t).unwrap();

        assert!(msg.mark_delivered(t + Duration::seconds(5)).is_err());
        assert_eq!(msg.status, MessageStatus::Seen);
        assert_eq!(msg.delivered_at, Some(t));
    }

    #[test]
    fn seen_never_precedes_delivered() {
        let mut msg = message();
        let delivered = msg.sent_at + Duration::seconds(10);
        msg.mark_delivered(delivered).unwrap();
        msg.mark_seen(delivered - Duration::seconds(4)).unwrap();

        assert!(msg.delivered_at.unwrap() <= msg.seen_at.unwrap());
    }

    #[test]
    fn media_only_preview() {
        let mut msg = message();
        msg.content = None;
        msg.attachment = Some(MediaAttachment {
            url: "https://cdn.example/a.png".into(),
            media_kind: MediaKind::Image,
        });
        assert_eq!(msg.preview_text(), MEDIA_PREVIEW);
        assert_eq!(MediaKind::from_tag("gif"), MediaKind::Unknown);
    }
}
