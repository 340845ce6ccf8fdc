use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use seamless_types::events::GatewayEvent;

/// Handle of one live gateway connection (one device/tab).
pub type ConnectionId = Uuid;

/// Tracks which user each live connection belongs to. A user may hold any
/// number of connections at once.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<PresenceInner>,
}

#[derive(Default)]
struct PresenceInner {
    /// Both indexes sit behind one lock so they cannot drift apart.
    state: RwLock<PresenceState>,
}

#[derive(Default)]
struct PresenceState {
    /// conn_id -> binding
    connections: HashMap<ConnectionId, Binding>,
    /// user_id -> conn_ids
    by_user: HashMap<Uuid, HashSet<ConnectionId>>,
}

struct Binding {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl PresenceState {
    fn detach(&mut self, connection_id: ConnectionId) -> Option<Uuid> {
        let binding = self.connections.remove(&connection_id)?;
        if let Some(conns) = self.by_user.get_mut(&binding.user_id) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                self.by_user.remove(&binding.user_id);
            }
        }
        Some(binding.user_id)
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `connection_id` to `user_id` and returns the receiving end of the
    /// connection's event channel. Rebinding an id replaces the old binding.
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        user_id: Uuid,
    ) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.inner.state.write().await;
        state.detach(connection_id);
        state.connections.insert(connection_id, Binding { user_id, tx });
        let conns = state.by_user.entry(user_id).or_default();
        conns.insert(connection_id);

        debug!("Bound connection {} to {} ({} live)", connection_id, user_id, conns.len());
        rx
    }

    /// Removes the binding, returning the user it belonged to.
    pub async fn unbind(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let user_id = self.inner.state.write().await.detach(connection_id);
        if let Some(user_id) = user_id {
            debug!("Unbound connection {} from {}", connection_id, user_id);
        }
        user_id
    }

    pub async fn connections_for(&self, user_id: Uuid) -> HashSet<ConnectionId> {
        self.inner
            .state
            .read()
            .await
            .by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.state.read().await.by_user.contains_key(&user_id)
    }

    /// Queues `event` on every live connection of `user_id`. Returns how many
    /// connections accepted it; closed channels are skipped silently.
    pub async fn send_to_user(&self, user_id: Uuid, event: &GatewayEvent) -> usize {
        let state = self.inner.state.read().await;
        let Some(conns) = state.by_user.get(&user_id) else {
            return 0;
        };

        conns
            .iter()
            .filter_map(|conn_id| state.connections.get(conn_id))
            .filter(|binding| binding.tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn send_to_connection(&self, connection_id: ConnectionId, event: GatewayEvent) -> bool {
        let state = self.inner.state.read().await;
        state
            .connections
            .get(&connection_id)
            .is_some_and(|binding| binding.tx.send(event).is_ok())
    }
}
