/// WebSocket session actor
///
/// Bridges one actix WebSocket to its `Connection`: frames queued on the connection's
/// outbox are written to the socket, pongs refresh the liveness flag, and on the
/// relay plane inbound text frames are decoded into `ClientEvent`s and handed to the
/// `RelayHandler`. Inbound events of one session are handled strictly in order.
use actix::{Actor, ActorContext, AsyncContext, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Connection, ConnectionCleanup, ConnectionRegistry, FrameReceiver, OutboundFrame, Plane};
use crate::metrics;
use crate::relay::{ClientEvent, RelayHandler, ServerEvent};

/// Inbound behaviour of a session
#[derive(Clone)]
pub enum SessionRole {
    /// Push-only channel; client text frames are ignored
    Notification,
    /// Room relay channel
    Relay(RelayHandler),
}

impl SessionRole {
    pub fn plane(&self) -> Plane {
        match self {
            SessionRole::Notification => Plane::Notification,
            SessionRole::Relay(_) => Plane::Relay,
        }
    }
}

pub struct WsSession {
    connection: Arc<Connection>,
    frames: Option<FrameReceiver>,
    registry: ConnectionRegistry,
    role: SessionRole,
    max_frame_bytes: usize,
}

impl WsSession {
    /// The connection must already be registered in `registry`
    pub fn new(
        connection: Arc<Connection>,
        frames: FrameReceiver,
        registry: ConnectionRegistry,
        role: SessionRole,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            connection,
            frames: Some(frames),
            registry,
            role,
            max_frame_bytes,
        }
    }

    fn reject(&self, message: String) {
        if let Ok(frame) = ServerEvent::error(message).to_frame() {
            let _ = self.connection.send_text(frame);
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let SessionRole::Relay(handler) = &self.role else {
            tracing::debug!(
                connection_id = %self.connection.id(),
                "ignoring client message on notification channel"
            );
            return;
        };

        if text.len() > self.max_frame_bytes {
            self.reject(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                text.len(),
                self.max_frame_bytes
            ));
            return;
        }

        match ClientEvent::from_json(text) {
            Ok(event) => {
                let handler = handler.clone();
                let connection = self.connection.clone();
                ctx.wait(
                    async move {
                        handler.handle(&connection, event).await;
                    }
                    .into_actor(self),
                );
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.connection.id(), error = %e, "undecodable relay event");
                self.reject(format!("invalid event: {e}"));
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            plane = self.role.plane().as_str(),
            user_id = %self.connection.user_id(),
            connection_id = %self.connection.id(),
            "WebSocket session started"
        );

        if let Some(frames) = self.frames.take() {
            ctx.add_stream(UnboundedReceiverStream::new(frames));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            plane = self.role.plane().as_str(),
            user_id = %self.connection.user_id(),
            connection_id = %self.connection.id(),
            "WebSocket session stopped"
        );

        self.connection.terminate();
        metrics::connection_closed(self.role.plane());

        let registry = self.registry.clone();
        let connection = self.connection.clone();
        let role = self.role.clone();
        actix::spawn(async move {
            registry.unregister(connection.id()).await;
            if let SessionRole::Relay(handler) = role {
                handler.on_disconnect(&connection).await;
            }
        });
    }
}

// Frames queued by the core
impl StreamHandler<OutboundFrame> for WsSession {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        match frame {
            OutboundFrame::Text(text) => ctx.text(text.to_string()),
            OutboundFrame::Ping => ctx.ping(b""),
            OutboundFrame::Close => {
                ctx.close(Some(ws::CloseCode::Away.into()));
                ctx.stop();
            }
        }
    }
}

// WebSocket protocol messages from the client
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.connection.mark_alive();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.connection.mark_alive();
            }
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(connection_id = %self.connection.id(), ?reason, "close frame received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %self.connection.id(), error = %e, "protocol error");
                ctx.stop();
            }
        }
    }
}
