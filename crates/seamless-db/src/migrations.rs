use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            pk                  TEXT NOT NULL,
            sk                  TEXT NOT NULL,
            conversation_id     TEXT NOT NULL UNIQUE,
            user1_id            TEXT NOT NULL,
            user2_id            TEXT NOT NULL,
            last_message_text   TEXT,
            last_message_at     INTEGER NOT NULL,
            PRIMARY KEY (pk, sk)
        );

        -- sk is the send time in microseconds; unique per conversation
        CREATE TABLE IF NOT EXISTS messages (
            pk                  TEXT NOT NULL,
            sk                  INTEGER NOT NULL,
            conversation_id     TEXT NOT NULL,
            message_id          TEXT NOT NULL UNIQUE,
            sender_id           TEXT NOT NULL,
            receiver_id         TEXT NOT NULL,
            content             TEXT,
            attachment_url      TEXT,
            attachment_kind     TEXT,
            status              TEXT NOT NULL,
            delivered_at        INTEGER,
            seen_at             INTEGER,
            PRIMARY KEY (pk, sk)
        );

        -- One row per (viewer, conversation); sk is last_message_at in microseconds
        CREATE TABLE IF NOT EXISTS inbox (
            pk                      TEXT NOT NULL,
            sk                      INTEGER NOT NULL,
            conversation_id         TEXT NOT NULL,
            user1_id                TEXT NOT NULL,
            user2_id                TEXT NOT NULL,
            other_participant_id    TEXT NOT NULL,
            last_message_text       TEXT,
            PRIMARY KEY (pk, conversation_id)
        );

        CREATE INDEX IF NOT EXISTS idx_inbox_recency
            ON inbox(pk, sk DESC);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
