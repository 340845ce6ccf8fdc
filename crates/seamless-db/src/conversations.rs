use anyhow::{Result, anyhow, ensure};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use seamless_types::ConversationKey;
use seamless_types::models::{Conversation, InboxEntry};

use crate::keys::{METADATA_SK, conversation_pk, to_micros, user_pk};
use crate::models::{CONVERSATION_COLUMNS, ConversationRow, INBOX_COLUMNS, InboxRow};
use crate::{Database, OptionalExt};

/// Result of a conditional preview write.
#[derive(Debug)]
pub enum PreviewUpdate {
    /// Preview and both inbox rows now reflect the new message.
    Applied(Conversation),
    /// The stored preview is newer than the one offered; nothing written.
    Stale(Conversation),
    NotFound,
}

impl Database {
    pub fn get_conversation(&self, key: &ConversationKey) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, key))
    }

    /// Returns the conversation for `key`, creating it (and both inbox rows)
    /// when absent. The insert is conditional: if another writer got there
    /// first, its record is returned instead.
    pub fn get_or_create_conversation(
        &self,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        if let Some(existing) = self.get_conversation(key)? {
            return Ok(existing);
        }

        let created = Conversation::new(key.clone(), now);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT INTO conversations (pk, sk, conversation_id, user1_id, user2_id, last_message_text, last_message_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)
                 ON CONFLICT(pk, sk) DO NOTHING",
                rusqlite::params![
                    conversation_pk(key),
                    METADATA_SK,
                    key.as_str(),
                    created.user1_id.to_string(),
                    created.user2_id.to_string(),
                    to_micros(created.last_message_at),
                ],
            )?;

            if inserted == 0 {
                debug!("Conversation {} already created by a concurrent writer", key);
                let winner = query_conversation(&tx, key)?
                    .ok_or_else(|| anyhow!("conversation {} missing after conflicting insert", key))?;
                tx.commit()?;
                return Ok(winner);
            }

            upsert_inbox(&tx, &created)?;
            tx.commit()?;

            debug!("Created conversation {}", key);
            Ok(created)
        })
    }

    /// Sets the preview only if `at` is not older than the stored
    /// `last_message_at`, then rebuilds both participants' inbox rows.
    pub fn update_preview(
        &self,
        key: &ConversationKey,
        text: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<PreviewUpdate> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE conversations SET last_message_text = ?1, last_message_at = ?2
                 WHERE pk = ?3 AND sk = ?4 AND last_message_at <= ?2",
                rusqlite::params![text, to_micros(at), conversation_pk(key), METADATA_SK],
            )?;

            let Some(conversation) = query_conversation(&tx, key)? else {
                return Ok(PreviewUpdate::NotFound);
            };

            if changed == 0 {
                debug!("Skipping stale preview for {} (stored is newer)", key);
                return Ok(PreviewUpdate::Stale(conversation));
            }

            upsert_inbox(&tx, &conversation)?;
            tx.commit()?;
            Ok(PreviewUpdate::Applied(conversation))
        })
    }

    /// Up to `limit` inbox rows for `user_id`, most recent first.
    pub fn get_inbox(&self, user_id: Uuid, limit: u32) -> Result<Vec<InboxEntry>> {
        ensure!(limit > 0, "inbox limit must be positive");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INBOX_COLUMNS} FROM inbox WHERE pk = ?1 ORDER BY sk DESC LIMIT ?2"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![user_pk(user_id), limit], InboxRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(InboxRow::into_entry).collect()
        })
    }
}

fn query_conversation(conn: &Connection, key: &ConversationKey) -> Result<Option<Conversation>> {
    let row = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE pk = ?1 AND sk = ?2"),
            rusqlite::params![conversation_pk(key), METADATA_SK],
            ConversationRow::from_row,
        )
        .optional()?;

    row.map(ConversationRow::into_conversation).transpose()
}

/// Writes the conversation's projection once per viewer.
fn upsert_inbox(conn: &Connection, conversation: &Conversation) -> Result<()> {
    let viewers = [
        (conversation.user1_id, conversation.user2_id),
        (conversation.user2_id, conversation.user1_id),
    ];

    for (viewer, other) in viewers {
        conn.execute(
            "INSERT INTO inbox (pk, sk, conversation_id, user1_id, user2_id, other_participant_id, last_message_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(pk, conversation_id) DO UPDATE SET
                sk = excluded.sk,
                last_message_text = excluded.last_message_text",
            rusqlite::params![
                user_pk(viewer),
                to_micros(conversation.last_message_at),
                conversation.conversation_id.as_str(),
                conversation.user1_id.to_string(),
                conversation.user2_id.to_string(),
                other.to_string(),
                conversation.last_message_text,
            ],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::Duration;

    use super::*;

    fn pair() -> (Uuid, Uuid, ConversationKey) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        (a, b, ConversationKey::resolve(a, b).unwrap())
    }

    fn metadata_rows(db: &Database, key: &ConversationKey) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE pk = ?1",
                [conversation_pk(key)],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, key) = pair();
        let now = Utc::now();

        let first = db.get_or_create_conversation(&key, now).unwrap();
        let second = db
            .get_or_create_conversation(&key, now + Duration::seconds(30))
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(second.last_message_text, None);
        assert_eq!(to_micros(second.last_message_at), to_micros(now));
        assert_eq!(metadata_rows(&db, &key), 1);
    }

    #[test]
    fn concurrent_get_or_create_yields_one_record() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (a, b, key) = pair();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [(a, b), (b, a)]
            .into_iter()
            .map(|(x, y)| {
                let db = db.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let key = ConversationKey::resolve(x, y).unwrap();
                    barrier.wait();
                    db.get_or_create_conversation(&key, Utc::now()).unwrap()
                })
            })
            .collect();

        let results: Vec<Conversation> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0].conversation_id, key);
        assert_eq!(results[1].conversation_id, key);
        assert_eq!(metadata_rows(&db, &key), 1);
    }

    #[test]
    fn creation_writes_both_inbox_rows() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, key) = pair();
        db.get_or_create_conversation(&key, Utc::now()).unwrap();

        let inbox_a = db.get_inbox(a, 10).unwrap();
        let inbox_b = db.get_inbox(b, 10).unwrap();
        assert_eq!(inbox_a.len(), 1);
        assert_eq!(inbox_b.len(), 1);
        assert_eq!(inbox_a[0].other_participant_id, b);
        assert_eq!(inbox_b[0].other_participant_id, a);
    }

    #[test]
    fn preview_update_refreshes_both_inboxes() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, key) = pair();
        let t0 = Utc::now();
        db.get_or_create_conversation(&key, t0).unwrap();

        let update = db
            .update_preview(&key, Some("x"), t0 + Duration::milliseconds(5))
            .unwrap();
        assert!(matches!(update, PreviewUpdate::Applied(_)));

        for user in [a, b] {
            let inbox = db.get_inbox(user, 1).unwrap();
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].conversation_id, key);
            assert_eq!(inbox[0].last_message_text.as_deref(), Some("x"));
        }
    }

    #[test]
    fn older_preview_does_not_overwrite_newer() {
        let db = Database::open_in_memory().unwrap();
        let (a, _, key) = pair();
        let t0 = Utc::now();
        db.get_or_create_conversation(&key, t0).unwrap();

        db.update_preview(&key, Some("newer"), t0 + Duration::seconds(2))
            .unwrap();
        let update = db
            .update_preview(&key, Some("older"), t0 + Duration::seconds(1))
            .unwrap();

        match update {
            PreviewUpdate::Stale(conversation) => {
                assert_eq!(conversation.last_message_text.as_deref(), Some("newer"))
            }
            other => panic!("expected stale update, got {other:?}"),
        }
        assert_eq!(
            db.get_inbox(a, 1).unwrap()[0].last_message_text.as_deref(),
            Some("newer")
        );
    }

    #[test]
    fn preview_for_unknown_conversation() {
        let db = Database::open_in_memory().unwrap();
        let (_, _, key) = pair();
        assert!(matches!(
            db.update_preview(&key, Some("x"), Utc::now()).unwrap(),
            PreviewUpdate::NotFound
        ));
    }

    #[test]
    fn inbox_is_sorted_by_recency_and_limited() {
        let db = Database::open_in_memory().unwrap();
        let me = Uuid::new_v4();
        let t0 = Utc::now();

        let mut keys = Vec::new();
        for i in 0..4 {
            let key = ConversationKey::resolve(me, Uuid::new_v4()).unwrap();
            db.get_or_create_conversation(&key, t0).unwrap();
            db.update_preview(&key, Some(&format!("m{i}")), t0 + Duration::seconds(i + 1))
                .unwrap();
            keys.push(key);
        }

        // Bump the oldest conversation to the top.
        db.update_preview(&keys[0], Some("again"), t0 + Duration::seconds(10))
            .unwrap();

        let inbox = db.get_inbox(me, 3).unwrap();
        let order: Vec<_> = inbox.iter().map(|e| e.conversation_id.clone()).collect();
        assert_eq!(order, vec![keys[0].clone(), keys[3].clone(), keys[2].clone()]);
        assert_eq!(db.get_inbox(me, 10).unwrap().len(), 4);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_inbox(Uuid::new_v4(), 0).is_err());
    }
}
