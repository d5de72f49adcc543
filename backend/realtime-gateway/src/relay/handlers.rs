/// Relay event handler table
///
/// Each `ClientEvent` kind maps to one policy on top of the generic
/// join / leave / broadcast / unicast primitives of `RoomRelay`:
/// - joins on chat, live class and generic rooms announce `userJoined` with the roster,
///   including to the joiner; forum post joins are silent
/// - chat messages are persisted, then relayed as `newMessage` to everyone but the
///   sending connection
/// - WebRTC signals are unicast to the addressed member only
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::events::{custom_frame, ClientEvent, RoomId, ServerEvent};
use super::rooms::RoomRelay;
use super::store::ChatStore;
use super::RelayError;
use crate::metrics;
use crate::models::ChatMessage;
use crate::websocket::{Connection, ConnectionCleanup, UserId};

#[derive(Clone)]
pub struct RelayHandler {
    relay: RoomRelay,
    store: Arc<dyn ChatStore>,
}

impl RelayHandler {
    pub fn new(relay: RoomRelay, store: Arc<dyn ChatStore>) -> Self {
        Self { relay, store }
    }

    pub fn relay(&self) -> &RoomRelay {
        &self.relay
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    /// Handle one decoded client event
    ///
    /// Failures are reported to the sender as an `error` event and never affect
    /// other connections.
    pub async fn handle(&self, sender: &Arc<Connection>, event: ClientEvent) {
        let name = event.name();
        metrics::record_relay_event(name);

        if let Err(e) = self.dispatch(sender, event).await {
            tracing::warn!(
                user_id = %sender.user_id(),
                connection_id = %sender.id(),
                event = name,
                error = %e,
                "relay event rejected"
            );
            self.report_error(sender, &e);
        }
    }

    async fn dispatch(&self, sender: &Arc<Connection>, event: ClientEvent) -> Result<(), RelayError> {
        let room = event.room()?;

        match event {
            ClientEvent::JoinRoom { .. }
            | ClientEvent::JoinChat { .. }
            | ClientEvent::JoinPost { .. }
            | ClientEvent::JoinLiveClass { .. } => self.join(sender, &room).await,

            ClientEvent::LeaveRoom { .. }
            | ClientEvent::LeaveChat { .. }
            | ClientEvent::LeavePost { .. }
            | ClientEvent::LeaveLiveClass { .. } => {
                if self.relay.leave(sender.id(), &room).await {
                    self.announce_leave(sender.user_id(), &room).await?;
                }
                Ok(())
            }

            ClientEvent::SendMessage { text, .. } | ClientEvent::SendLiveMessage { text, .. } => {
                self.send_chat(sender, &room, text).await
            }

            ClientEvent::Offer {
                class_id,
                target_user_id,
                sdp,
            } => {
                let event = ServerEvent::Offer {
                    class_id,
                    from_user_id: sender.user_id().clone(),
                    sdp,
                };
                self.signal(sender, &room, &target_user_id, event).await
            }
            ClientEvent::Answer {
                class_id,
                target_user_id,
                sdp,
            } => {
                let event = ServerEvent::Answer {
                    class_id,
                    from_user_id: sender.user_id().clone(),
                    sdp,
                };
                self.signal(sender, &room, &target_user_id, event).await
            }
            ClientEvent::IceCandidate {
                class_id,
                target_user_id,
                candidate,
            } => {
                let event = ServerEvent::IceCandidate {
                    class_id,
                    from_user_id: sender.user_id().clone(),
                    candidate,
                };
                self.signal(sender, &room, &target_user_id, event).await
            }
        }
    }

    async fn join(&self, sender: &Arc<Connection>, room: &RoomId) -> Result<(), RelayError> {
        let added = self.relay.join(sender.id(), room).await;
        if !added || !room.announces_presence() {
            return Ok(());
        }

        let event = ServerEvent::UserJoined {
            room_id: room.clone(),
            user_id: sender.user_id().clone(),
            members: self.relay.roster(room).await,
        };
        self.relay.broadcast(room, event.to_frame()?, None).await;
        Ok(())
    }

    async fn announce_leave(&self, user_id: &UserId, room: &RoomId) -> Result<(), RelayError> {
        if !room.announces_presence() {
            return Ok(());
        }

        let members = self.relay.roster(room).await;
        // Another tab of the same user is still in the room.
        if members.contains(user_id) {
            return Ok(());
        }

        let event = ServerEvent::UserLeft {
            room_id: room.clone(),
            user_id: user_id.clone(),
            members,
        };
        self.relay.broadcast(room, event.to_frame()?, None).await;
        Ok(())
    }

    async fn send_chat(
        &self,
        sender: &Arc<Connection>,
        room: &RoomId,
        text: String,
    ) -> Result<(), RelayError> {
        self.require_member(sender, room).await?;
        if text.trim().is_empty() {
            return Err(RelayError::EmptyMessage);
        }

        let message = ChatMessage::new(room.as_str(), sender.user_id().clone(), text);
        let stored = self
            .store
            .save_message(message)
            .await
            .map_err(|e| RelayError::Store(e.to_string()))?;

        let frame = ServerEvent::NewMessage(stored).to_frame()?;
        let delivered = self.relay.broadcast(room, frame, Some(sender.id())).await;
        tracing::debug!(%room, delivered, "chat message relayed");
        Ok(())
    }

    async fn signal(
        &self,
        sender: &Arc<Connection>,
        room: &RoomId,
        target: &UserId,
        event: ServerEvent,
    ) -> Result<(), RelayError> {
        self.require_member(sender, room).await?;
        let frame = event.to_frame()?;
        self.relay.unicast(room, target, frame).await?;
        Ok(())
    }

    async fn require_member(&self, sender: &Connection, room: &RoomId) -> Result<(), RelayError> {
        if self.relay.is_member(sender.id(), room).await {
            Ok(())
        } else {
            Err(RelayError::NotAMember(room.clone()))
        }
    }

    fn report_error(&self, sender: &Connection, err: &RelayError) {
        match ServerEvent::error(err.to_string()).to_frame() {
            Ok(frame) => {
                if let Err(e) = sender.send_text(frame) {
                    tracing::debug!(connection_id = %sender.id(), error = %e, "could not report relay error");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize error event"),
        }
    }

    /// Relay a committed forum reply to everyone watching the post
    pub async fn publish_reply(&self, post_id: &str, reply: Value) -> Result<usize, RelayError> {
        let room = RoomId::post(post_id)?;
        let event = ServerEvent::NewReply {
            post_id: post_id.to_string(),
            reply,
        };
        metrics::record_relay_event(event.name());
        Ok(self.relay.broadcast(&room, event.to_frame()?, None).await)
    }

    /// Relay an arbitrary application event to a room
    pub async fn publish(
        &self,
        room: &RoomId,
        event: &str,
        payload: &Value,
    ) -> Result<usize, RelayError> {
        if event.trim().is_empty() {
            return Err(RelayError::InvalidEvent(event.to_string()));
        }
        metrics::record_relay_event("custom");
        Ok(self.relay.broadcast(room, custom_frame(event, payload)?, None).await)
    }
}

#[async_trait]
impl ConnectionCleanup for RelayHandler {
    async fn on_disconnect(&self, connection: &Connection) {
        for room in self.relay.leave_all(connection.id()).await {
            if let Err(e) = self.announce_leave(connection.user_id(), &room).await {
                tracing::debug!(%room, error = %e, "failed to announce departure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::InMemoryChatStore;
    use crate::websocket::{ConnectionRegistry, FrameReceiver, OutboundFrame};
    use serde_json::json;

    struct Harness {
        registry: ConnectionRegistry,
        handler: RelayHandler,
    }

    impl Harness {
        fn new() -> Self {
            let registry = ConnectionRegistry::new();
            let relay = RoomRelay::new(registry.clone());
            let handler = RelayHandler::new(relay, Arc::new(InMemoryChatStore::new()));
            Self { registry, handler }
        }

        async fn connect(&self, user: &str) -> (Arc<Connection>, FrameReceiver) {
            let (conn, rx) = Connection::new(UserId::parse(user).unwrap());
            self.registry.register(conn.clone()).await;
            (conn, rx)
        }
    }

    fn next_event(rx: &mut FrameReceiver) -> Option<ServerEvent> {
        match rx.try_recv().ok()? {
            OutboundFrame::Text(text) => Some(ServerEvent::from_json(&text).unwrap()),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_chat_broadcasts_roster_to_joiner() {
        let h = Harness::new();
        let (s1, mut rx) = h.connect("s1").await;

        h.handler
            .handle(&s1, ClientEvent::JoinChat { course_id: "course123".into() })
            .await;

        match next_event(&mut rx) {
            Some(ServerEvent::UserJoined { room_id, user_id, members }) => {
                assert_eq!(room_id.as_str(), "chat:course123");
                assert_eq!(user_id.as_str(), "s1");
                assert_eq!(members, vec![UserId::parse("s1").unwrap()]);
            }
            other => panic!("expected userJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_join_is_announced_once() {
        let h = Harness::new();
        let (s1, mut rx) = h.connect("s1").await;

        for _ in 0..2 {
            h.handler
                .handle(&s1, ClientEvent::JoinChat { course_id: "course123".into() })
                .await;
        }

        assert!(matches!(next_event(&mut rx), Some(ServerEvent::UserJoined { .. })));
        assert!(next_event(&mut rx).is_none());
    }

    #[tokio::test]
    async fn test_join_post_is_silent() {
        let h = Harness::new();
        let (c, mut rx) = h.connect("u1").await;

        h.handler.handle(&c, ClientEvent::JoinPost { post_id: "p1".into() }).await;

        assert!(next_event(&mut rx).is_none());
        assert!(h.handler.relay().is_member(c.id(), &RoomId::post("p1").unwrap()).await);
    }

    #[tokio::test]
    async fn test_send_message_requires_membership() {
        let h = Harness::new();
        let (c, mut rx) = h.connect("u1").await;

        h.handler
            .handle(
                &c,
                ClientEvent::SendMessage { course_id: "c1".into(), text: "hi".into() },
            )
            .await;

        assert!(matches!(next_event(&mut rx), Some(ServerEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_chat_message_persisted_before_relay() {
        let h = Harness::new();
        let (s1, mut rx_s) = h.connect("s1").await;
        let (t1, mut rx_t) = h.connect("t1").await;
        for c in [&s1, &t1] {
            h.handler.handle(c, ClientEvent::JoinChat { course_id: "c1".into() }).await;
        }
        while next_event(&mut rx_s).is_some() {}
        while next_event(&mut rx_t).is_some() {}

        h.handler
            .handle(&s1, ClientEvent::SendMessage { course_id: "c1".into(), text: "hello".into() })
            .await;

        let history = h
            .handler
            .store()
            .history(&RoomId::chat("c1").unwrap(), 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        match next_event(&mut rx_t) {
            Some(ServerEvent::NewMessage(msg)) => assert_eq!(msg.id, history[0].id),
            other => panic!("expected newMessage, got {other:?}"),
        }
        assert!(next_event(&mut rx_s).is_none());
    }

    #[tokio::test]
    async fn test_leave_announces_departure() {
        let h = Harness::new();
        let (a, _rx_a) = h.connect("a").await;
        let (b, mut rx_b) = h.connect("b").await;
        for c in [&a, &b] {
            h.handler.handle(c, ClientEvent::JoinLiveClass { class_id: "x".into() }).await;
        }
        while next_event(&mut rx_b).is_some() {}

        h.handler.handle(&a, ClientEvent::LeaveLiveClass { class_id: "x".into() }).await;

        match next_event(&mut rx_b) {
            Some(ServerEvent::UserLeft { user_id, members, .. }) => {
                assert_eq!(user_id.as_str(), "a");
                assert_eq!(members, vec![UserId::parse("b").unwrap()]);
            }
            other => panic!("expected userLeft, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_reply_reaches_post_watchers() {
        let h = Harness::new();
        let (c, mut rx) = h.connect("u1").await;
        h.handler.handle(&c, ClientEvent::JoinPost { post_id: "p1".into() }).await;

        let delivered = h
            .handler
            .publish_reply("p1", json!({"id": "r1", "body": "+1"}))
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert!(matches!(next_event(&mut rx), Some(ServerEvent::NewReply { .. })));
    }

    #[tokio::test]
    async fn test_publish_rejects_blank_event_name() {
        let h = Harness::new();
        let room = RoomId::new("any").unwrap();
        assert!(matches!(
            h.handler.publish(&room, " ", &json!({})).await,
            Err(RelayError::InvalidEvent(_))
        ));
    }
}
