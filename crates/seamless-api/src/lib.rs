use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use seamless_core::ChatService;
use seamless_gateway::RealtimeBroadcaster;

pub mod chat;
pub mod error;
pub mod middleware;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub broadcaster: RealtimeBroadcaster,
    pub jwt_secret: String,
}

/// The `/chat` REST surface. Every route requires a bearer token.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat/send", post(chat::send_message))
        .route("/chat/messages", get(chat::load_messages))
        .route("/chat/delivered", post(chat::mark_delivered))
        .route("/chat/seen", post(chat::mark_seen))
        .route("/chat/inbox", get(chat::inbox))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
