/// Notification Dispatcher
///
/// Live-push path for notifications: best-effort, fire-and-forget. Durable delivery
/// for offline users is the notification store's job; clients backfill from it over
/// plain HTTP after reconnecting.
use crate::error::AppResult;
use crate::metrics;
use crate::models::Notification;
use crate::websocket::{ConnectionRegistry, PushMessage, UserId};

#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: ConnectionRegistry,
}

impl NotificationDispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Push a notification to every open connection of `user_id`
    ///
    /// Returns how many sockets the frame was written to. Connections that are not
    /// open are skipped; the heartbeat monitor reclaims them. Zero live connections
    /// is the common offline case and not an error.
    pub async fn send_to_user(
        &self,
        user_id: &UserId,
        notification: &Notification,
    ) -> AppResult<usize> {
        notification.validate()?;

        let connections = self.registry.connections_for(user_id).await;
        if connections.is_empty() {
            tracing::debug!(%user_id, "user offline, skipping live push");
            return Ok(0);
        }

        let frame = PushMessage::Notification(notification.clone()).to_frame()?;

        let mut delivered = 0;
        for connection in connections.iter().filter(|c| c.is_open()) {
            match connection.send_text(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    %user_id,
                    connection_id = %connection.id(),
                    error = %e,
                    "skipping connection during notification push"
                ),
            }
        }

        metrics::record_notifications_pushed(delivered);
        tracing::debug!(
            %user_id,
            kind = notification.kind.as_str(),
            delivered,
            "notification pushed"
        );
        Ok(delivered)
    }
}
