//! Database row types, mapped directly from SQLite rows.
//! Distinct from seamless-types models to keep the DB layer independent.

use anyhow::{Result, anyhow};
use rusqlite::Row;
use uuid::Uuid;

use seamless_types::models::{Conversation, InboxEntry, MediaAttachment, MediaKind, Message};
use seamless_types::{ConversationKey, MessageStatus};

use crate::keys::from_micros;

pub struct ConversationRow {
    pub conversation_id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub last_message_text: Option<String>,
    pub last_message_at: i64,
}

pub struct MessageRow {
    pub sk: i64,
    pub conversation_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_kind: Option<String>,
    pub status: String,
    pub delivered_at: Option<i64>,
    pub seen_at: Option<i64>,
}

pub struct InboxRow {
    pub sk: i64,
    pub conversation_id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub other_participant_id: String,
    pub last_message_text: Option<String>,
}

pub(crate) const CONVERSATION_COLUMNS: &str =
    "conversation_id, user1_id, user2_id, last_message_text, last_message_at";

pub(crate) const MESSAGE_COLUMNS: &str = "sk, conversation_id, message_id, sender_id, receiver_id, \
     content, attachment_url, attachment_kind, status, delivered_at, seen_at";

pub(crate) const INBOX_COLUMNS: &str =
    "sk, conversation_id, user1_id, user2_id, other_participant_id, last_message_text";

impl ConversationRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            conversation_id: row.get(0)?,
            user1_id: row.get(1)?,
            user2_id: row.get(2)?,
            last_message_text: row.get(3)?,
            last_message_at: row.get(4)?,
        })
    }

    pub fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            conversation_id: parse_key(&self.conversation_id)?,
            user1_id: parse_uuid(&self.user1_id, "user1_id")?,
            user2_id: parse_uuid(&self.user2_id, "user2_id")?,
            last_message_text: self.last_message_text,
            last_message_at: from_micros(self.last_message_at)?,
        })
    }
}

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sk: row.get(0)?,
            conversation_id: row.get(1)?,
            message_id: row.get(2)?,
            sender_id: row.get(3)?,
            receiver_id: row.get(4)?,
            content: row.get(5)?,
            attachment_url: row.get(6)?,
            attachment_kind: row.get(7)?,
            status: row.get(8)?,
            delivered_at: row.get(9)?,
            seen_at: row.get(10)?,
        })
    }

    pub fn into_message(self) -> Result<Message> {
        let attachment = match (self.attachment_url, self.attachment_kind) {
            (Some(url), kind) => Some(MediaAttachment {
                url,
                media_kind: kind.as_deref().map_or(MediaKind::Unknown, MediaKind::from_tag),
            }),
            (None, _) => None,
        };

        let status: MessageStatus = self
            .status
            .parse()
            .map_err(|e| anyhow!("message {}: {}", self.message_id, e))?;

        Ok(Message {
            message_id: parse_uuid(&self.message_id, "message_id")?,
            conversation_id: parse_key(&self.conversation_id)?,
            sender_id: parse_uuid(&self.sender_id, "sender_id")?,
            receiver_id: parse_uuid(&self.receiver_id, "receiver_id")?,
            content: self.content,
            attachment,
            status,
            sent_at: from_micros(self.sk)?,
            delivered_at: self.delivered_at.map(from_micros).transpose()?,
            seen_at: self.seen_at.map(from_micros).transpose()?,
        })
    }
}

impl InboxRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sk: row.get(0)?,
            conversation_id: row.get(1)?,
            user1_id: row.get(2)?,
            user2_id: row.get(3)?,
            other_participant_id: row.get(4)?,
            last_message_text: row.get(5)?,
        })
    }

    pub fn into_entry(self) -> Result<InboxEntry> {
        Ok(InboxEntry {
            conversation_id: parse_key(&self.conversation_id)?,
            user1_id: parse_uuid(&self.user1_id, "user1_id")?,
            user2_id: parse_uuid(&self.user2_id, "user2_id")?,
            other_participant_id: parse_uuid(&self.other_participant_id, "other_participant_id")?,
            last_message_text: self.last_message_text,
            last_message_at: from_micros(self.sk)?,
        })
    }
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| anyhow!("corrupt {} '{}': {}", column, raw, e))
}

fn parse_key(raw: &str) -> Result<ConversationKey> {
    raw.parse().map_err(|e| anyhow!("corrupt conversation_id: {}", e))
}
