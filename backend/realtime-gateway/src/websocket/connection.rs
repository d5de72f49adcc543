/// Transport-level connection handle
///
/// A `Connection` is the registry's view of one live socket. The socket itself is
/// owned by a transport adapter (see `session`), which drains the outbox receiver and
/// writes each `OutboundFrame` to the wire. Writes from the core are therefore
/// non-blocking channel sends, and per-connection ordering follows channel order.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Unique identifier for one transport-level connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Logical user identity supplied by the upstream authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Parse a user id, rejecting empty or whitespace-only values
    pub fn parse(raw: impl AsRef<str>) -> AppResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AppError::MissingUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frames the core asks the transport adapter to write
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Serialized JSON text frame, shared between all recipients of a fan-out
    Text(Arc<str>),
    /// Liveness probe
    Ping,
    /// Forcibly close the socket
    Close,
}

pub type FrameSender = UnboundedSender<OutboundFrame>;
pub type FrameReceiver = UnboundedReceiver<OutboundFrame>;

/// One live socket belonging to exactly one user
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    outbox: FrameSender,
    alive: AtomicBool,
    closing: AtomicBool,
}

impl Connection {
    /// Create a connection and the receiver its transport adapter must drain
    pub fn new(user_id: UserId) -> (Arc<Self>, FrameReceiver) {
        let (tx, rx) = unbounded_channel();
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            user_id,
            outbox: tx,
            alive: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Whether the transport is still accepting writes
    pub fn is_open(&self) -> bool {
        !self.closing.load(Ordering::Acquire) && !self.outbox.is_closed()
    }

    /// Queue a serialized text frame
    pub fn send_text(&self, payload: Arc<str>) -> AppResult<()> {
        self.push(OutboundFrame::Text(payload))
    }

    /// Queue a liveness probe
    pub fn probe(&self) -> AppResult<()> {
        self.push(OutboundFrame::Ping)
    }

    /// Record a pong. Ignored once termination has started.
    pub fn mark_alive(&self) {
        if !self.closing.load(Ordering::Acquire) {
            self.alive.store(true, Ordering::Release);
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Clear the liveness flag, returning its previous value
    pub(crate) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Ask the transport to drop the socket. Idempotent.
    pub fn terminate(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            self.alive.store(false, Ordering::Release);
            // The adapter may already be gone; nothing left to close then.
            let _ = self.outbox.send(OutboundFrame::Close);
        }
    }

    fn push(&self, frame: OutboundFrame) -> AppResult<()> {
        if self.closing.load(Ordering::Acquire) {
            return Err(AppError::ConnectionClosed(self.id));
        }
        self.outbox
            .send(frame)
            .map_err(|_| AppError::ConnectionClosed(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(matches!(UserId::parse(""), Err(AppError::MissingUserId)));
        assert!(matches!(UserId::parse("   "), Err(AppError::MissingUserId)));
        assert_eq!(UserId::parse(" u1 ").unwrap().as_str(), "u1");
    }

    #[tokio::test]
    async fn test_send_text_reaches_receiver() {
        let (conn, mut rx) = Connection::new(user("u1"));
        conn.send_text(Arc::from("hello")).unwrap();
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text(Arc::from("hello"))));
    }

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (conn, rx) = Connection::new(user("u1"));
        drop(rx);
        assert!(!conn.is_open());
        assert!(matches!(
            conn.send_text(Arc::from("x")),
            Err(AppError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (conn, mut rx) = Connection::new(user("u1"));
        conn.terminate();
        conn.terminate();
        assert!(!conn.is_open());
        assert_eq!(rx.recv().await, Some(OutboundFrame::Close));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_pong_after_terminate_is_discarded() {
        let (conn, _rx) = Connection::new(user("u1"));
        conn.terminate();
        conn.mark_alive();
        assert!(!conn.is_alive());
    }
}
