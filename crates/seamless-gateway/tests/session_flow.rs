use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use uuid::Uuid;

use seamless_core::ChatService;
use seamless_db::Database;
use seamless_gateway::{RealtimeBroadcaster, Session};
use seamless_types::api::SendMessageRequest;
use seamless_types::events::{GatewayCommand, GatewayEvent};
use seamless_types::{ConversationKey, MessageStatus};

struct Device {
    session: Session,
    events: UnboundedReceiver<GatewayEvent>,
}

async fn connect(chat: &ChatService, broadcaster: &RealtimeBroadcaster, user_id: Uuid) -> Device {
    let connection_id = Uuid::new_v4();
    let events = broadcaster.presence().bind(connection_id, user_id).await;
    let session = Session::new(chat.clone(), broadcaster.clone(), user_id, connection_id);
    Device { session, events }
}

fn setup() -> (ChatService, RealtimeBroadcaster) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (ChatService::new(db), RealtimeBroadcaster::default())
}

fn text(sender_id: Uuid, receiver_id: Uuid, body: &str) -> GatewayCommand {
    GatewayCommand::SendMessage(SendMessageRequest {
        sender_id,
        receiver_id,
        content: Some(body.to_string()),
        attachment: None,
    })
}

#[tokio::test]
async fn send_deliver_and_read_over_the_gateway() {
    let (chat, broadcaster) = setup();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_dev = connect(&chat, &broadcaster, alice).await;
    let mut bob_dev = connect(&chat, &broadcaster, bob).await;

    alice_dev.session.handle(text(alice, bob, "hello")).await;

    let Ok(GatewayEvent::ReceiveMessage(message)) = bob_dev.events.try_recv() else {
        panic!("bob should receive the message");
    };
    assert_eq!(message.content.as_deref(), Some("hello"));
    assert!(matches!(alice_dev.events.try_recv(), Ok(GatewayEvent::ReceiveMessage(_))));

    let key = ConversationKey::resolve(alice, bob).unwrap();
    bob_dev
        .session
        .handle(GatewayCommand::MarkDelivered {
            conversation_id: key.clone(),
            message_id: message.message_id,
            other_participant_id: alice,
        })
        .await;
    assert!(matches!(
        alice_dev.events.try_recv(),
        Ok(GatewayEvent::MessageDelivered { message_id, .. }) if message_id == message.message_id
    ));

    bob_dev
        .session
        .handle(GatewayCommand::MarkSeen {
            conversation_id: key.clone(),
            message_id: message.message_id,
            other_participant_id: alice,
        })
        .await;
    assert!(matches!(
        alice_dev.events.try_recv(),
        Ok(GatewayEvent::MessageSeen { message_id, .. }) if message_id == message.message_id
    ));
    assert_eq!(bob_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);

    let page = chat.load_messages(alice, alice, bob, 40, None).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].status, MessageStatus::Seen);
    assert!(!page.has_more);

    let inbox = chat.inbox(bob, 30).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].other_participant_id, alice);
    assert_eq!(inbox[0].last_message_text.as_deref(), Some("hello"));
}

#[tokio::test]
async fn repeated_acknowledgement_is_not_rebroadcast() {
    let (chat, broadcaster) = setup();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_dev = connect(&chat, &broadcaster, alice).await;
    let mut bob_dev = connect(&chat, &broadcaster, bob).await;

    alice_dev.session.handle(text(alice, bob, "ping")).await;
    let Ok(GatewayEvent::ReceiveMessage(message)) = bob_dev.events.try_recv() else {
        panic!("bob should receive the message");
    };
    let _echo = alice_dev.events.try_recv();

    let key = ConversationKey::resolve(alice, bob).unwrap();
    let ack = || GatewayCommand::MarkDelivered {
        conversation_id: key.clone(),
        message_id: message.message_id,
        other_participant_id: alice,
    };
    bob_dev.session.handle(ack()).await;
    bob_dev.session.handle(ack()).await;

    assert!(matches!(alice_dev.events.try_recv(), Ok(GatewayEvent::MessageDelivered { .. })));
    assert_eq!(alice_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(bob_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn wrong_other_participant_hint_is_ignored() {
    let (chat, broadcaster) = setup();
    let (alice, bob, mallory) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut alice_dev = connect(&chat, &broadcaster, alice).await;
    let mut bob_dev = connect(&chat, &broadcaster, bob).await;
    let mut mallory_dev = connect(&chat, &broadcaster, mallory).await;

    alice_dev.session.handle(text(alice, bob, "private")).await;
    let Ok(GatewayEvent::ReceiveMessage(message)) = bob_dev.events.try_recv() else {
        panic!("bob should receive the message");
    };
    let _echo = alice_dev.events.try_recv();

    bob_dev
        .session
        .handle(GatewayCommand::MarkSeen {
            conversation_id: ConversationKey::resolve(alice, bob).unwrap(),
            message_id: message.message_id,
            other_participant_id: mallory,
        })
        .await;

    assert!(matches!(alice_dev.events.try_recv(), Ok(GatewayEvent::MessageSeen { .. })));
    assert_eq!(mallory_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn failures_are_reported_to_the_issuing_connection_only() {
    let (chat, broadcaster) = setup();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_dev = connect(&chat, &broadcaster, alice).await;
    let mut alice_other = connect(&chat, &broadcaster, alice).await;
    let mut bob_dev = connect(&chat, &broadcaster, bob).await;

    // Impersonating bob as the sender.
    alice_dev.session.handle(text(bob, alice, "forged")).await;

    assert!(matches!(alice_dev.events.try_recv(), Ok(GatewayEvent::Error { .. })));
    assert_eq!(alice_other.events.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(bob_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);
    assert!(chat.inbox(bob, 30).await.unwrap().is_empty());
}

#[tokio::test]
async fn self_messaging_is_rejected() {
    let (chat, broadcaster) = setup();
    let alice = Uuid::new_v4();
    let mut alice_dev = connect(&chat, &broadcaster, alice).await;

    alice_dev.session.handle(text(alice, alice, "me")).await;
    alice_dev
        .session
        .handle(GatewayCommand::Typing { receiver_id: alice })
        .await;

    assert!(matches!(alice_dev.events.try_recv(), Ok(GatewayEvent::Error { .. })));
    assert!(matches!(alice_dev.events.try_recv(), Ok(GatewayEvent::Error { .. })));
    assert_eq!(alice_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn typing_reaches_the_receiver() {
    let (chat, broadcaster) = setup();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let mut alice_dev = connect(&chat, &broadcaster, alice).await;
    let mut bob_dev = connect(&chat, &broadcaster, bob).await;

    alice_dev
        .session
        .handle(GatewayCommand::Typing { receiver_id: bob })
        .await;

    let expected = ConversationKey::resolve(alice, bob).unwrap();
    assert!(matches!(
        bob_dev.events.try_recv(),
        Ok(GatewayEvent::TypingStarted { sender_id, conversation_id })
            if sender_id == alice && conversation_id == expected
    ));
    assert_eq!(alice_dev.events.try_recv().unwrap_err(), TryRecvError::Empty);
}
