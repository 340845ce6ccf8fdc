use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use seamless_db::{Database, PreviewUpdate, StatusUpdate};
use seamless_types::api::{LoadMessagesResponse, SendMessageRequest};
use seamless_types::models::{Conversation, InboxEntry, Message};
use seamless_types::ConversationKey;

use crate::error::ChatError;

/// Result of a delivered/seen acknowledgement.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub message: Message,
    /// False when the message already had the requested status.
    pub advanced: bool,
    /// The participant who did not perform the action.
    pub notify_user_id: Uuid,
}

/// Durable chat operations. Every method finishes its store writes before
/// returning, so callers may broadcast afterwards.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
}

impl ChatService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Runs blocking store work off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(db.as_ref())).await??)
    }

    pub async fn get_or_create_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Conversation, ChatError> {
        let key = ConversationKey::resolve(user_a, user_b)?;
        self.run(move |db| db.get_or_create_conversation(&key, Utc::now()))
            .await
    }

    /// Stores a message from `caller` and refreshes the conversation preview.
    pub async fn send_message(
        &self,
        caller: Uuid,
        req: SendMessageRequest,
    ) -> Result<Message, ChatError> {
        if req.sender_id != caller {
            return Err(ChatError::Unauthorized);
        }

        let key = ConversationKey::resolve(req.sender_id, req.receiver_id)?;
        let content = req.content.filter(|c| !c.is_empty());
        if content.is_none() && req.attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let (sender_id, receiver_id, attachment) = (req.sender_id, req.receiver_id, req.attachment);

        let stored = self
            .run(move |db| {
                db.get_or_create_conversation(&key, Utc::now())?;

                let message = Message::new(key.clone(), sender_id, receiver_id, content, attachment, Utc::now());
                let stored = db.append_message(&message)?;

                match db.update_preview(&key, Some(stored.preview_text()), stored.sent_at)? {
                    PreviewUpdate::Applied(_) => {}
                    PreviewUpdate::Stale(_) => {
                        debug!("Preview for {} already newer than {}", key, stored.message_id)
                    }
                    PreviewUpdate::NotFound => {
                        warn!("Conversation {} vanished before preview update", key)
                    }
                }

                Ok(stored)
            })
            .await?;

        debug!(
            "Stored message {} in {} ({} -> {})",
            stored.message_id, stored.conversation_id, stored.sender_id, stored.receiver_id
        );
        Ok(stored)
    }

    /// One page of the conversation between `user1` and `user2`, newest first.
    /// `caller` must be one of the two.
    pub async fn load_messages(
        &self,
        caller: Uuid,
        user1: Uuid,
        user2: Uuid,
        limit: u32,
        before: Option<i64>,
    ) -> Result<LoadMessagesResponse, ChatError> {
        let key = ConversationKey::resolve(user1, user2)?;
        if !key.contains(caller) {
            return Err(ChatError::Unauthorized);
        }
        if limit == 0 {
            return Err(ChatError::InvalidLimit);
        }

        let page = self
            .run(move |db| db.page_messages(&key, limit, before))
            .await?;

        Ok(LoadMessagesResponse {
            messages: page.messages,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    pub async fn mark_delivered(
        &self,
        caller: Uuid,
        key: ConversationKey,
        message_id: Uuid,
    ) -> Result<StatusChange, ChatError> {
        self.acknowledge(caller, key, message_id, Ack::Delivered).await
    }

    pub async fn mark_seen(
        &self,
        caller: Uuid,
        key: ConversationKey,
        message_id: Uuid,
    ) -> Result<StatusChange, ChatError> {
        self.acknowledge(caller, key, message_id, Ack::Seen).await
    }

    /// Only the receiver of a message may acknowledge it.
    async fn acknowledge(
        &self,
        caller: Uuid,
        key: ConversationKey,
        message_id: Uuid,
        ack: Ack,
    ) -> Result<StatusChange, ChatError> {
        let notify_user_id = key.other_participant(caller).ok_or(ChatError::Unauthorized)?;

        let outcome = self
            .run(move |db| {
                if db.get_conversation(&key)?.is_none() {
                    return Ok(AckOutcome::NoConversation(key.to_string()));
                }
                match db.get_message(&key, message_id)? {
                    None => return Ok(AckOutcome::Update(StatusUpdate::NotFound)),
                    Some(message) if message.receiver_id != caller => {
                        return Ok(AckOutcome::NotReceiver);
                    }
                    Some(_) => {}
                }

                let now = Utc::now();
                let update = match ack {
                    Ack::Delivered => db.mark_delivered(&key, message_id, now)?,
                    Ack::Seen => db.mark_seen(&key, message_id, now)?,
                };
                Ok(AckOutcome::Update(update))
            })
            .await?;

        let (message, advanced) = match outcome {
            AckOutcome::NoConversation(key) => return Err(ChatError::ConversationNotFound(key)),
            AckOutcome::NotReceiver => return Err(ChatError::Unauthorized),
            AckOutcome::Update(StatusUpdate::NotFound) => {
                return Err(ChatError::MessageNotFound(message_id));
            }
            AckOutcome::Update(StatusUpdate::Rejected(e)) => return Err(e.into()),
            AckOutcome::Update(StatusUpdate::Unchanged(message)) => (message, false),
            AckOutcome::Update(StatusUpdate::Applied(message)) => (message, true),
        };

        debug!(
            "Message {} is {} (advanced: {})",
            message.message_id, message.status, advanced
        );

        Ok(StatusChange {
            message,
            advanced,
            notify_user_id,
        })
    }

    pub async fn inbox(&self, user_id: Uuid, limit: u32) -> Result<Vec<InboxEntry>, ChatError> {
        if limit == 0 {
            return Err(ChatError::InvalidLimit);
        }
        self.run(move |db| db.get_inbox(user_id, limit)).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Ack {
    Delivered,
    Seen,
}

enum AckOutcome {
    NoConversation(String),
    NotReceiver,
    Update(StatusUpdate),
}
