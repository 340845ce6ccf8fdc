//! Partition/sort key layout shared by every table.
//!
//! - conversation metadata: `(CONVERSATION#{key}, METADATA)`
//! - message:               `(CONVERSATION#{key}, {sent_at µs})`
//! - inbox row:             `(USER#{viewer}, {last_message_at µs})`

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use seamless_types::ConversationKey;

pub const METADATA_SK: &str = "METADATA";

pub fn conversation_pk(key: &ConversationKey) -> String {
    format!("CONVERSATION#{}", key)
}

pub fn user_pk(user_id: Uuid) -> String {
    format!("USER#{}", user_id)
}

/// Timestamps are stored as microseconds since the Unix epoch.
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| anyhow!("timestamp out of range: {}", micros))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_round_trip_truncates_nanos() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let back = from_micros(to_micros(ts)).unwrap();
        assert_eq!(back.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn key_prefixes() {
        let user = Uuid::nil();
        assert_eq!(user_pk(user), "USER#00000000-0000-0000-0000-000000000000");

        let key = ConversationKey::resolve(Uuid::nil(), Uuid::from_u128(u128::MAX)).unwrap();
        assert!(conversation_pk(&key).starts_with("CONVERSATION#00000000-"));
    }
}
