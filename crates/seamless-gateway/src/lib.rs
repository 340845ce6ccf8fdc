pub mod broadcaster;
pub mod connection;
pub mod presence;

pub use broadcaster::RealtimeBroadcaster;
pub use connection::{Session, handle_connection};
pub use presence::{ConnectionId, PresenceRegistry};
