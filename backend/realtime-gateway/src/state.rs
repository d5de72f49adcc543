use std::sync::Arc;

use crate::config::Config;
use crate::relay::{ChatStore, InMemoryChatStore, RelayHandler, RoomRelay};
use crate::services::NotificationDispatcher;
use crate::websocket::ConnectionRegistry;

/// Shared handles injected into every HTTP and WebSocket handler
#[derive(Clone)]
pub struct AppState {
    /// Connections on the notification push channel
    pub notifications: ConnectionRegistry,
    /// Connections on the room relay channel
    pub relay_connections: ConnectionRegistry,
    pub dispatcher: NotificationDispatcher,
    pub relay: RelayHandler,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        let notifications = ConnectionRegistry::new();
        let relay_connections = ConnectionRegistry::new();
        let dispatcher = NotificationDispatcher::new(notifications.clone());
        let relay = RelayHandler::new(RoomRelay::new(relay_connections.clone()), store);

        Self {
            notifications,
            relay_connections,
            dispatcher,
            relay,
            config: Arc::new(config),
        }
    }

    /// State backed by the in-process chat store, capped per room by config
    pub fn in_memory(config: Config) -> Self {
        let store = InMemoryChatStore::with_capacity_per_room(config.chat.history_per_room);
        Self::new(config, Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{ClientEvent, RoomId};
    use crate::websocket::{Connection, UserId};

    #[tokio::test]
    async fn test_in_memory_history_is_capped_per_room() {
        let mut config = Config::default();
        config.chat.history_per_room = 2;
        let state = AppState::in_memory(config);

        let (sender, _rx) = Connection::new(UserId::parse("u1").unwrap());
        state.relay_connections.register(sender.clone()).await;
        state
            .relay
            .handle(&sender, ClientEvent::JoinChat { course_id: "c1".into() })
            .await;
        for text in ["one", "two", "three"] {
            state
                .relay
                .handle(
                    &sender,
                    ClientEvent::SendMessage { course_id: "c1".into(), text: text.into() },
                )
                .await;
        }

        let history = state
            .relay
            .store()
            .history(&RoomId::chat("c1").unwrap(), 10)
            .await
            .unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);
    }
}
