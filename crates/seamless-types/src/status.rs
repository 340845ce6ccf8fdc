use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery state of a message. Variants are declared in lattice order,
/// so `Sent < Delivered < Seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
}

/// Outcome of applying a status to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status moved forward and must be persisted.
    Advanced,
    /// The message was already in the requested state.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move message status from {from} back to {to}")]
pub struct TransitionError {
    pub from: MessageStatus,
    pub to: MessageStatus,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "Sent",
            Self::Delivered => "Delivered",
            Self::Seen => "Seen",
        }
    }

    /// Checks a move from `self` to `target`. Only forward moves advance;
    /// repeating the current state is a no-op and nothing goes backwards.
    pub fn transition(self, target: MessageStatus) -> Result<Transition, TransitionError> {
        match self.cmp(&target) {
            std::cmp::Ordering::Less => Ok(Transition::Advanced),
            std::cmp::Ordering::Equal => Ok(Transition::Unchanged),
            std::cmp::Ordering::Greater => Err(TransitionError {
                from: self,
                to: target,
            }),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sent" => Ok(Self::Sent),
            "Delivered" => Ok(Self::Delivered),
            "Seen" => Ok(Self::Seen),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}
