use axum::http::StatusCode;
use tracing::{debug, error};

use seamless_core::ChatError;

/// Maps a service error to the response status, logging server-side faults.
pub fn reject(err: ChatError) -> StatusCode {
    let status = match &err {
        ChatError::InvalidParticipants(_)
        | ChatError::InvalidConversationKey(_)
        | ChatError::InvalidLimit
        | ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
        ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
        ChatError::ConversationNotFound(_) | ChatError::MessageNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::InvalidTransition { .. } => StatusCode::CONFLICT,
        ChatError::Storage(_) | ChatError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected ({}): {}", status, err);
    }
    status
}
