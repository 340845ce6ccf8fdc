use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const KEY_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("conversation participants must be different users")]
pub struct InvalidParticipants;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed conversation key: {0}")]
pub struct InvalidConversationKey(pub String);

/// Canonical, order-independent identifier of a two-party conversation.
///
/// Rendered as `"{low}_{high}"`, where `low` and `high` are the participants'
/// hyphenated UUID strings in lexicographic order. Resolving `(a, b)` and
/// `(b, a)` always yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationKey {
    key: String,
    low: Uuid,
    high: Uuid,
}

impl ConversationKey {
    pub fn resolve(user_a: Uuid, user_b: Uuid) -> Result<Self, InvalidParticipants> {
        if user_a == user_b {
            return Err(InvalidParticipants);
        }

        let (a, b) = (user_a.to_string(), user_b.to_string());
        let ((low, low_str), (high, high_str)) = if a < b {
            ((user_a, a), (user_b, b))
        } else {
            ((user_b, b), (user_a, a))
        };

        Ok(Self {
            key: format!("{low_str}{KEY_SEPARATOR}{high_str}"),
            low,
            high,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Participants in canonical order.
    pub fn participants(&self) -> (Uuid, Uuid) {
        (self.low, self.high)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The participant that is not `user_id`, if `user_id` belongs to this conversation.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.low {
            Some(self.high)
        } else if user_id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for ConversationKey {
    type Err = InvalidConversationKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidConversationKey(s.chars().take(80).collect());

        let (first, second) = s.split_once(KEY_SEPARATOR).ok_or_else(invalid)?;
        let first: Uuid = first.parse().map_err(|_| invalid())?;
        let second: Uuid = second.parse().map_err(|_| invalid())?;

        // Only the canonical rendering is accepted: ordered, hyphenated, lowercase.
        let key = Self::resolve(first, second).map_err(|_| invalid())?;
        if key.key != s {
            return Err(invalid());
        }
        Ok(key)
    }
}

impl TryFrom<String> for ConversationKey {
    type Error = InvalidConversationKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.key
    }
}
