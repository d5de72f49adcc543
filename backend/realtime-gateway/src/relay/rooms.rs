/// Room membership and fan-out
///
/// Rooms are created lazily on first join and dropped when their last member leaves.
/// Membership is kept in both directions so a disconnect can clear every room a
/// connection belonged to without scanning all rooms.
///
/// Locking: the room map lock is never held while the registry lock is awaited.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::events::RoomId;
use super::RelayError;
use crate::websocket::{Connection, ConnectionId, ConnectionRegistry, UserId};

#[derive(Default)]
struct RoomsInner {
    /// room -> member connections
    members: HashMap<RoomId, HashSet<ConnectionId>>,
    /// connection -> rooms joined
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

#[derive(Clone)]
pub struct RoomRelay {
    registry: ConnectionRegistry,
    rooms: Arc<RwLock<RoomsInner>>,
}

impl RoomRelay {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            rooms: Arc::new(RwLock::new(RoomsInner::default())),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub async fn join(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        let mut guard = self.rooms.write().await;
        let added = guard
            .members
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
        guard
            .memberships
            .entry(connection_id)
            .or_default()
            .insert(room.clone());

        if added {
            tracing::debug!(%connection_id, %room, "joined room");
        }
        added
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub async fn leave(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        let mut guard = self.rooms.write().await;
        let removed = Self::remove_member(&mut guard, connection_id, room);

        if let Some(rooms) = guard.memberships.get_mut(&connection_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                guard.memberships.remove(&connection_id);
            }
        }

        if removed {
            tracing::debug!(%connection_id, %room, "left room");
        }
        removed
    }

    /// Drop every membership of a connection, returning the rooms it was in
    pub async fn leave_all(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        let mut guard = self.rooms.write().await;
        let rooms: Vec<RoomId> = guard
            .memberships
            .remove(&connection_id)
            .map(|rooms| rooms.into_iter().collect())
            .unwrap_or_default();

        for room in &rooms {
            Self::remove_member(&mut guard, connection_id, room);
        }

        if !rooms.is_empty() {
            tracing::debug!(%connection_id, rooms = rooms.len(), "cleared room memberships");
        }
        rooms
    }

    pub async fn is_member(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        let guard = self.rooms.read().await;
        guard
            .members
            .get(room)
            .map(|members| members.contains(&connection_id))
            .unwrap_or(false)
    }

    pub async fn rooms_of(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        let guard = self.rooms.read().await;
        guard
            .memberships
            .get(&connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.members.len()
    }

    pub async fn member_count(&self, room: &RoomId) -> usize {
        let guard = self.rooms.read().await;
        guard.members.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Distinct users currently in a room, sorted
    pub async fn roster(&self, room: &RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .live_members(room)
            .await
            .iter()
            .map(|c| c.user_id().clone())
            .collect();
        users.sort();
        users.dedup();
        users
    }

    /// Write a frame to every member of a room except `except`
    ///
    /// Relaying into an empty or unknown room is a no-op. A failed write to one
    /// member is logged and skipped; the rest of the fan-out continues.
    pub async fn broadcast(
        &self,
        room: &RoomId,
        frame: Arc<str>,
        except: Option<ConnectionId>,
    ) -> usize {
        let members = self.live_members(room).await;
        let mut delivered = 0;

        for connection in members
            .iter()
            .filter(|c| Some(c.id()) != except && c.is_open())
        {
            match connection.send_text(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    %room,
                    connection_id = %connection.id(),
                    error = %e,
                    "skipping member during room broadcast"
                ),
            }
        }
        delivered
    }

    /// Write a frame only to `target`'s connections inside `room`
    pub async fn unicast(
        &self,
        room: &RoomId,
        target: &UserId,
        frame: Arc<str>,
    ) -> Result<usize, RelayError> {
        let targets: Vec<Arc<Connection>> = self
            .live_members(room)
            .await
            .into_iter()
            .filter(|c| c.user_id() == target && c.is_open())
            .collect();

        if targets.is_empty() {
            return Err(RelayError::TargetNotInRoom {
                room: room.clone(),
                target: target.clone(),
            });
        }

        let mut delivered = 0;
        for connection in &targets {
            match connection.send_text(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    %room,
                    %target,
                    error = %e,
                    "unicast write failed"
                ),
            }
        }
        Ok(delivered)
    }

    /// Members that are still registered; stale ids are ignored
    async fn live_members(&self, room: &RoomId) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = {
            let guard = self.rooms.read().await;
            match guard.members.get(room) {
                Some(members) => members.iter().copied().collect(),
                None => return Vec::new(),
            }
        };

        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(connection) = self.registry.get(id).await {
                live.push(connection);
            }
        }
        live
    }

    fn remove_member(inner: &mut RoomsInner, connection_id: ConnectionId, room: &RoomId) -> bool {
        let Some(members) = inner.members.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        if members.is_empty() {
            inner.members.remove(room);
            tracing::debug!(%room, "room empty, dropped");
        }
        removed
    }
}
