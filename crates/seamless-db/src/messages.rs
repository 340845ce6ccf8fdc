use anyhow::{Result, ensure};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use seamless_types::models::Message;
use seamless_types::{ConversationKey, Transition, TransitionError};

use crate::keys::{conversation_pk, from_micros, to_micros};
use crate::models::{MESSAGE_COLUMNS, MessageRow};
use crate::{Database, OptionalExt};

/// One page of a conversation log, newest first.
#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Send time (µs) of the oldest message on this page when older ones exist.
    pub next_cursor: Option<i64>,
    pub has_more: bool,
}

/// Outcome of a delivered/seen write.
#[derive(Debug)]
pub enum StatusUpdate {
    /// Status moved forward and was persisted.
    Applied(Message),
    /// Message already had that status; nothing written.
    Unchanged(Message),
    /// The move would go backwards; nothing written.
    Rejected(TransitionError),
    NotFound,
}

impl Database {
    /// Appends `message` to its conversation log and returns the stored copy.
    ///
    /// The sort key is the send time in microseconds. If that slot is taken,
    /// or an even later message is already stored, the key is bumped to one
    /// microsecond after the newest stored message, so keys stay unique and
    /// strictly increasing per conversation. The returned `sent_at` is the
    /// allocated key.
    pub fn append_message(&self, message: &Message) -> Result<Message> {
        let pk = conversation_pk(&message.conversation_id);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let latest: Option<i64> = tx.query_row(
                "SELECT MAX(sk) FROM messages WHERE pk = ?1",
                [&pk],
                |row| row.get(0),
            )?;

            let requested = to_micros(message.sent_at);
            let sk = match latest {
                Some(latest) if latest >= requested => {
                    debug!(
                        "Send time collision in {}: bumping {} -> {}",
                        message.conversation_id,
                        requested,
                        latest + 1
                    );
                    latest + 1
                }
                _ => requested,
            };

            let mut stored = message.clone();
            stored.sent_at = from_micros(sk)?;

            tx.execute(
                &format!("INSERT INTO messages (pk, {MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
                rusqlite::params![
                    pk,
                    sk,
                    stored.conversation_id.as_str(),
                    stored.message_id.to_string(),
                    stored.sender_id.to_string(),
                    stored.receiver_id.to_string(),
                    stored.content,
                    stored.attachment.as_ref().map(|a| a.url.as_str()),
                    stored.attachment.as_ref().map(|a| a.media_kind.as_str()),
                    stored.status.as_str(),
                    stored.delivered_at.map(to_micros),
                    stored.seen_at.map(to_micros),
                ],
            )?;

            tx.commit()?;
            Ok(stored)
        })
    }

    /// Backward cursor pagination: up to `limit` messages sent strictly before
    /// `before` (µs), newest first. One extra row is read to decide `has_more`.
    pub fn page_messages(
        &self,
        key: &ConversationKey,
        limit: u32,
        before: Option<i64>,
    ) -> Result<MessagePage> {
        ensure!(limit > 0, "page limit must be positive");

        let pk = conversation_pk(key);
        let cursor = before.unwrap_or(i64::MAX);
        let fetch = i64::from(limit) + 1;

        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE pk = ?1 AND sk < ?2
                 ORDER BY sk DESC
                 LIMIT ?3"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![pk, cursor, fetch], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })?;

        let mut messages = rows
            .into_iter()
            .map(MessageRow::into_message)
            .collect::<Result<Vec<_>>>()?;

        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);

        let next_cursor = if has_more {
            messages.last().map(|m| to_micros(m.sent_at))
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_cursor,
            has_more,
        })
    }

    /// Looks a message up by id within one conversation. Served by the
    /// unique `message_id` index; an id stored under another conversation
    /// is not found.
    pub fn get_message(&self, key: &ConversationKey, message_id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            query_message(conn, &conversation_pk(key), message_id)?
                .map(MessageRow::into_message)
                .transpose()
        })
    }

    pub fn mark_delivered(
        &self,
        key: &ConversationKey,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate> {
        self.update_status(key, message_id, |message| message.mark_delivered(at))
    }

    pub fn mark_seen(
        &self,
        key: &ConversationKey,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate> {
        self.update_status(key, message_id, |message| message.mark_seen(at))
    }

    /// Read-modify-write of one message's status inside a transaction.
    fn update_status<F>(&self, key: &ConversationKey, message_id: Uuid, apply: F) -> Result<StatusUpdate>
    where
        F: FnOnce(&mut Message) -> std::result::Result<Transition, TransitionError>,
    {
        let pk = conversation_pk(key);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(row) = query_message(&tx, &pk, message_id)? else {
                return Ok(StatusUpdate::NotFound);
            };
            let sk = row.sk;
            let mut message = row.into_message()?;

            let update = match apply(&mut message) {
                Err(rejected) => StatusUpdate::Rejected(rejected),
                Ok(Transition::Unchanged) => StatusUpdate::Unchanged(message),
                Ok(Transition::Advanced) => {
                    tx.execute(
                        "UPDATE messages SET status = ?1, delivered_at = ?2, seen_at = ?3
                         WHERE pk = ?4 AND sk = ?5",
                        rusqlite::params![
                            message.status.as_str(),
                            message.delivered_at.map(to_micros),
                            message.seen_at.map(to_micros),
                            pk,
                            sk,
                        ],
                    )?;
                    StatusUpdate::Applied(message)
                }
            };

            tx.commit()?;
            Ok(update)
        })
    }
}

fn query_message(conn: &Connection, pk: &str, message_id: Uuid) -> Result<Option<MessageRow>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE pk = ?1 AND message_id = ?2"),
        rusqlite::params![pk, message_id.to_string()],
        MessageRow::from_row,
    )
    .optional()
}
