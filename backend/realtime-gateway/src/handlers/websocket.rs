/// WebSocket upgrade endpoints
///
/// `GET /ws?userId=...` opens a push-only notification channel.
/// `GET /socket.io/?userId=...` opens a room relay channel.
///
/// A request without a usable `userId` is rejected before the upgrade, so no
/// anonymous connection is ever registered.
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

use crate::metrics;
use crate::state::AppState;
use crate::websocket::session::SessionRole;
use crate::websocket::{Connection, ConnectionRegistry, Plane, PushMessage, UserId, WsSession};

/// Codec allowance above the configured frame limit, so oversized frames still
/// reach the session and are answered with an `error` event instead of a
/// protocol close.
const FRAME_HEADROOM_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl WsParams {
    fn user_id(&self) -> Result<UserId, Error> {
        Ok(UserId::parse(self.user_id.as_deref().unwrap_or_default())?)
    }
}

/// Notification channel upgrade
pub async fn notification_socket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let user_id = query.user_id()?;
    let max_frame_bytes = state.config.websocket.max_frame_bytes;
    start_session(
        &req,
        stream,
        &state.notifications,
        user_id,
        SessionRole::Notification,
        max_frame_bytes,
    )
    .await
}

/// Relay channel upgrade
pub async fn relay_socket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let user_id = query.user_id()?;
    let max_frame_bytes = state.config.websocket.max_frame_bytes;
    start_session(
        &req,
        stream,
        &state.relay_connections,
        user_id,
        SessionRole::Relay(state.relay.clone()),
        max_frame_bytes,
    )
    .await
}

async fn start_session(
    req: &HttpRequest,
    stream: web::Payload,
    registry: &ConnectionRegistry,
    user_id: UserId,
    role: SessionRole,
    max_frame_bytes: usize,
) -> Result<HttpResponse, Error> {
    let plane = role.plane();
    let (connection, frames) = Connection::new(user_id);
    registry.register(connection.clone()).await;

    let session = WsSession::new(
        connection.clone(),
        frames,
        registry.clone(),
        role,
        max_frame_bytes,
    );

    let started = ws::WsResponseBuilder::new(session, req, stream)
        .frame_size(max_frame_bytes.saturating_add(FRAME_HEADROOM_BYTES))
        .start();

    match started {
        Ok(response) => {
            metrics::connection_opened(plane);
            tracing::info!(
                plane = plane.as_str(),
                user_id = %connection.user_id(),
                connection_id = %connection.id(),
                "WebSocket connection accepted"
            );

            if plane == Plane::Notification {
                let greeting =
                    PushMessage::connected(connection.id(), connection.user_id().clone());
                match greeting.to_frame() {
                    Ok(frame) => {
                        let _ = connection.send_text(frame);
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to encode connected greeting"),
                }
            }

            Ok(response)
        }
        Err(e) => {
            tracing::warn!(
                plane = plane.as_str(),
                user_id = %connection.user_id(),
                error = %e,
                "WebSocket handshake failed"
            );
            connection.terminate();
            registry.unregister(connection.id()).await;
            Err(e)
        }
    }
}

/// Register WebSocket upgrade routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(notification_socket))
        .route("/socket.io/", web::get().to(relay_socket));
}
