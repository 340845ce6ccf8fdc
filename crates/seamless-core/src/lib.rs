pub mod chat;
pub mod error;

pub use chat::{ChatService, StatusChange};
pub use error::ChatError;
