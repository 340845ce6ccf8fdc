use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use seamless_types::api::{Claims, MarkDeliveredRequest, MarkSeenRequest, SendMessageRequest};

use crate::AppState;
use crate::error::reject;

/// Upper bound on any single page, whatever the client asks for.
const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    #[serde(default = "default_message_limit")]
    pub limit: u32,
    /// Cursor from the previous page: microseconds since the epoch.
    pub before: Option<i64>,
}

fn default_message_limit() -> u32 {
    40
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default = "default_inbox_limit")]
    pub limit: u32,
}

fn default_inbox_limit() -> u32 {
    30
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .chat
        .send_message(claims.sub, req)
        .await
        .map_err(reject)?;

    state.broadcaster.notify_new_message(&message).await;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn load_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let page = state
        .chat
        .load_messages(
            claims.sub,
            query.user1_id,
            query.user2_id,
            query.limit.min(MAX_PAGE_SIZE),
            query.before,
        )
        .await
        .map_err(reject)?;

    Ok(Json(page))
}

pub async fn mark_delivered(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkDeliveredRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let change = state
        .chat
        .mark_delivered(claims.sub, req.conversation_id.clone(), req.message_id)
        .await
        .map_err(reject)?;

    if change.advanced {
        state
            .broadcaster
            .notify_delivered(req.message_id, &req.conversation_id, change.notify_user_id)
            .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkSeenRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let change = state
        .chat
        .mark_seen(claims.sub, req.conversation_id.clone(), req.message_id)
        .await
        .map_err(reject)?;

    if change.advanced {
        state
            .broadcaster
            .notify_seen(req.message_id, &req.conversation_id, change.notify_user_id)
            .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<InboxQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let entries = state
        .chat
        .inbox(claims.sub, query.limit.min(MAX_PAGE_SIZE))
        .await
        .map_err(reject)?;

    Ok(Json(entries))
}
