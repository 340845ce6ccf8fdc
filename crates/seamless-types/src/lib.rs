pub mod api;
pub mod events;
pub mod identity;
pub mod models;
pub mod status;

pub use identity::{ConversationKey, InvalidConversationKey, InvalidParticipants};
pub use status::{MessageStatus, Transition, TransitionError};
