use thiserror::Error;
use uuid::Uuid;

use seamless_types::{InvalidConversationKey, InvalidParticipants, MessageStatus, TransitionError};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    InvalidParticipants(#[from] InvalidParticipants),

    #[error(transparent)]
    InvalidConversationKey(#[from] InvalidConversationKey),

    /// Sender mismatch or access by someone outside the conversation.
    #[error("not allowed to act on this conversation")]
    Unauthorized,

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(Uuid),

    #[error("cannot move message from {from} back to {to}")]
    InvalidTransition { from: MessageStatus, to: MessageStatus },

    #[error("limit must be positive")]
    InvalidLimit,

    #[error("message needs content or an attachment")]
    EmptyMessage,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<TransitionError> for ChatError {
    fn from(e: TransitionError) -> Self {
        Self::InvalidTransition {
            from: e.from,
            to: e.to,
        }
    }
}

impl ChatError {
    /// Client-caused failures, as opposed to storage or runtime faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Join(_))
    }
}
