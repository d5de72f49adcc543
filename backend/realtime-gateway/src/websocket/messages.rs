/// Server -> client messages on the notification channel
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ConnectionId, UserId};
use crate::models::Notification;

/// Serialized as `{ "type": "...", "data": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum PushMessage {
    /// A notification copy pushed at delivery time
    Notification(Notification),

    /// Handshake confirmation
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
    },
}

impl PushMessage {
    pub fn connected(connection_id: ConnectionId, user_id: UserId) -> Self {
        PushMessage::Connected {
            connection_id,
            user_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize once into a frame payload shared by every recipient
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        self.to_json().map(Arc::from)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use serde_json::Value;

    #[test]
    fn test_notification_envelope_shape() {
        let notification = Notification::new("Course purchased", "Welcome aboard", NotificationKind::Success);
        let json: Value = serde_json::from_str(
            &PushMessage::Notification(notification).to_json().unwrap(),
        )
        .unwrap();

        assert_eq!(json["type"], "notification");
        assert_eq!(json["data"]["title"], "Course purchased");
        assert_eq!(json["data"]["type"], "success");
        assert_eq!(json["data"]["isRead"], false);
        assert!(json["data"].get("link").is_none());
        assert!(json["data"]["createdAt"].is_string());
    }

    #[test]
    fn test_connected_message() {
        let user_id = UserId::parse("u1").unwrap();
        let msg = PushMessage::connected(ConnectionId::new(), user_id);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"userId\":\"u1\""));
        assert_eq!(PushMessage::from_json(&json).unwrap(), msg);
    }
}
