use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use seamless_core::{ChatError, ChatService, StatusChange};
use seamless_types::ConversationKey;
use seamless_types::api::SendMessageRequest;
use seamless_types::events::{GatewayCommand, GatewayEvent};

use crate::broadcaster::RealtimeBroadcaster;
use crate::presence::ConnectionId;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket whose bearer token was already validated at upgrade.
/// The connection is bound to `user_id` for its whole lifetime.
pub async fn handle_connection(
    socket: WebSocket,
    chat: ChatService,
    broadcaster: RealtimeBroadcaster,
    user_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();

    let connection_id = Uuid::new_v4();
    let mut events = broadcaster.presence().bind(connection_id, user_id).await;
    info!("{} connected to gateway (connection {})", user_id, connection_id);

    if !send_event(&mut sender, &GatewayEvent::Ready { user_id }).await {
        broadcaster.presence().unbind(connection_id).await;
        return;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on {} (missed {} pongs), dropping connection", connection_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let session = Session::new(chat, broadcaster.clone(), user_id, connection_id);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => session.handle(cmd).await,
                    Err(e) => {
                        warn!("{} bad command ({} bytes): {}", user_id, text.len(), e);
                        session.reply_error(format!("bad command: {e}")).await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.presence().unbind(connection_id).await;
    info!("{} disconnected from gateway (connection {})", user_id, connection_id);
}

/// Returns false once the socket can no longer be written.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            true
        }
    }
}

/// Executes gateway commands on behalf of one authenticated connection.
/// Durable writes finish before anything is pushed; failures are reported
/// back to this connection only.
pub struct Session {
    chat: ChatService,
    broadcaster: RealtimeBroadcaster,
    user_id: Uuid,
    connection_id: ConnectionId,
}

impl Session {
    pub fn new(
        chat: ChatService,
        broadcaster: RealtimeBroadcaster,
        user_id: Uuid,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            chat,
            broadcaster,
            user_id,
            connection_id,
        }
    }

    pub async fn handle(&self, cmd: GatewayCommand) {
        let result = match cmd {
            GatewayCommand::SendMessage(req) => self.send_message(req).await,

            GatewayCommand::Typing { receiver_id } => self.typing(receiver_id).await,

            GatewayCommand::MarkDelivered {
                conversation_id,
                message_id,
                other_participant_id,
            } => {
                self.mark_delivered(conversation_id, message_id, other_participant_id)
                    .await
            }

            GatewayCommand::MarkSeen {
                conversation_id,
                message_id,
                other_participant_id,
            } => {
                self.mark_seen(conversation_id, message_id, other_participant_id)
                    .await
            }
        };

        if let Err(e) = result {
            if e.is_client_error() {
                warn!("{} command rejected: {}", self.user_id, e);
                self.reply_error(e.to_string()).await;
            } else {
                error!("{} command failed: {}", self.user_id, e);
                self.reply_error("internal error".to_string()).await;
            }
        }
    }

    async fn send_message(&self, req: SendMessageRequest) -> Result<(), ChatError> {
        let message = self.chat.send_message(self.user_id, req).await?;
        self.broadcaster.notify_new_message(&message).await;
        Ok(())
    }

    async fn typing(&self, receiver_id: Uuid) -> Result<(), ChatError> {
        let conversation_id = ConversationKey::resolve(self.user_id, receiver_id)?;
        self.broadcaster
            .notify_typing(self.user_id, receiver_id, &conversation_id)
            .await;
        Ok(())
    }

    async fn mark_delivered(
        &self,
        conversation_id: ConversationKey,
        message_id: Uuid,
        other_participant_id: Uuid,
    ) -> Result<(), ChatError> {
        let change = self
            .chat
            .mark_delivered(self.user_id, conversation_id.clone(), message_id)
            .await?;
        let target = self.notify_target(&change, other_participant_id);
        if change.advanced {
            self.broadcaster
                .notify_delivered(message_id, &conversation_id, target)
                .await;
        }
        Ok(())
    }

    async fn mark_seen(
        &self,
        conversation_id: ConversationKey,
        message_id: Uuid,
        other_participant_id: Uuid,
    ) -> Result<(), ChatError> {
        let change = self
            .chat
            .mark_seen(self.user_id, conversation_id.clone(), message_id)
            .await?;
        let target = self.notify_target(&change, other_participant_id);
        if change.advanced {
            self.broadcaster
                .notify_seen(message_id, &conversation_id, target)
                .await;
        }
        Ok(())
    }

    /// The conversation decides who is notified; a disagreeing client hint is logged and ignored.
    fn notify_target(&self, change: &StatusChange, claimed: Uuid) -> Uuid {
        if claimed != change.notify_user_id {
            warn!(
                "{} named {} as other participant of {}, using {}",
                self.user_id, claimed, change.message.conversation_id, change.notify_user_id
            );
        }
        change.notify_user_id
    }

    pub async fn reply_error(&self, message: String) {
        self.broadcaster
            .presence()
            .send_to_connection(self.connection_id, GatewayEvent::Error { message })
            .await;
    }
}
