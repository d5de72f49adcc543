/// Connection Registry
///
/// Authoritative mapping `user_id -> live connections` for one transport plane.
/// Supports:
/// - Multiple concurrent connections per user (tabs, devices)
/// - Idempotent unregister (disconnect and heartbeat eviction may race)
/// - Dropping a user's entry as soon as their last connection goes away
///
/// The registry is constructed by the server bootstrap and handed to the dispatcher,
/// the relay and the heartbeat monitor. Clones share the same underlying map.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionId, UserId};

#[derive(Default)]
struct RegistryInner {
    /// user_id -> connection_id -> connection
    by_user: HashMap<UserId, HashMap<ConnectionId, Arc<Connection>>>,
    /// connection_id -> owning user, for O(1) unregister
    owners: HashMap<ConnectionId, UserId>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to its owner's set, creating the set if absent
    ///
    /// Callers must register each physical connection once.
    pub async fn register(&self, connection: Arc<Connection>) {
        let mut guard = self.inner.write().await;
        let user_id = connection.user_id().clone();
        let connection_id = connection.id();

        guard.owners.insert(connection_id, user_id.clone());
        let connections = guard.by_user.entry(user_id.clone()).or_default();
        connections.insert(connection_id, connection);

        tracing::debug!(
            %user_id,
            %connection_id,
            user_connections = connections.len(),
            "registered connection"
        );
    }

    /// Remove a connection from its owner's set
    ///
    /// Returns the removed connection, or `None` if it was already gone.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        let mut guard = self.inner.write().await;
        let user_id = guard.owners.remove(&connection_id)?;

        let mut removed = None;
        let mut now_empty = false;
        if let Some(connections) = guard.by_user.get_mut(&user_id) {
            removed = connections.remove(&connection_id);
            now_empty = connections.is_empty();
        }
        if now_empty {
            guard.by_user.remove(&user_id);
            tracing::debug!(%user_id, "last connection closed, dropped user entry");
        }

        tracing::debug!(%user_id, %connection_id, "unregistered connection");
        removed
    }

    /// Snapshot of live connections for a user; empty for unknown users
    pub async fn connections_for(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        let guard = self.inner.read().await;
        guard
            .by_user
            .get(user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        let guard = self.inner.read().await;
        let user_id = guard.owners.get(&connection_id)?;
        guard
            .by_user
            .get(user_id)
            .and_then(|connections| connections.get(&connection_id))
            .cloned()
    }

    /// Snapshot of every registered connection
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let guard = self.inner.read().await;
        guard
            .by_user
            .values()
            .flat_map(|connections| connections.values().cloned())
            .collect()
    }

    pub async fn connection_count(&self, user_id: &UserId) -> usize {
        let guard = self.inner.read().await;
        guard.by_user.get(user_id).map(|c| c.len()).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        self.inner.read().await.owners.len()
    }

    pub async fn connected_users_count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    pub async fn contains_user(&self, user_id: &UserId) -> bool {
        self.inner.read().await.by_user.contains_key(user_id)
    }

    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        let guard = self.inner.read().await;
        guard.by_user.keys().cloned().collect()
    }

    /// Terminate and forget every connection (graceful shutdown)
    pub async fn clear_all(&self) {
        let mut guard = self.inner.write().await;
        for connection in guard.by_user.values().flat_map(|c| c.values()) {
            connection.terminate();
        }
        guard.by_user.clear();
        guard.owners.clear();
    }
}
