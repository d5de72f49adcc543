/// HTTP publish and introspection API
///
/// Used by collaborators that live outside the socket layer: the purchase flow
/// pushes notifications, the forum pushes committed replies, and any feature can
/// fan an application event out to a room.
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::Notification;
use crate::relay::RoomId;
use crate::state::AppState;
use crate::websocket::UserId;

#[derive(Debug, Deserialize)]
pub struct RoomEventRequest {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Push a notification to every live connection of a user
///
/// Endpoint: POST /api/v1/notifications/{user_id}
pub async fn push_notification(
    path: web::Path<String>,
    state: web::Data<AppState>,
    body: web::Json<Notification>,
) -> AppResult<HttpResponse> {
    let user_id = UserId::parse(path.into_inner())?;
    let notification = body.into_inner();

    let delivered = state.dispatcher.send_to_user(&user_id, &notification).await?;

    Ok(HttpResponse::Ok().json(json!({
        "delivered_to": delivered,
        "user_id": user_id,
    })))
}

/// Relay a committed forum reply to everyone viewing the post
///
/// Endpoint: POST /api/v1/posts/{post_id}/replies
pub async fn publish_reply(
    path: web::Path<String>,
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let delivered = state
        .relay
        .publish_reply(&post_id, body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "delivered_to": delivered,
        "post_id": post_id,
    })))
}

/// Broadcast an application event to a room
///
/// Endpoint: POST /api/v1/rooms/{room_id}/events
pub async fn publish_room_event(
    path: web::Path<String>,
    state: web::Data<AppState>,
    body: web::Json<RoomEventRequest>,
) -> AppResult<HttpResponse> {
    let room = RoomId::new(path.into_inner())?;
    let request = body.into_inner();

    let delivered = state
        .relay
        .publish(&room, &request.event, &request.payload)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "delivered_to": delivered,
        "room_id": room,
        "event": request.event,
    })))
}

/// Get WebSocket connection status for a user
///
/// Endpoint: GET /api/v1/ws/status/{user_id}
pub async fn ws_status(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let user_id = UserId::parse(path.into_inner())?;

    let connection_count = state.notifications.connection_count(&user_id).await;
    let relay_connection_count = state.relay_connections.connection_count(&user_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "connected": connection_count > 0,
        "connection_count": connection_count,
        "relay_connection_count": relay_connection_count,
    })))
}

/// Get connection and room counters
///
/// Endpoint: GET /api/v1/ws/stats
pub async fn ws_stats(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let total_connections = state.notifications.total_connections().await;
    let connected_users = state.notifications.connected_users_count().await;
    let relay_connections = state.relay_connections.total_connections().await;
    let live_rooms = state.relay.relay().room_count().await;

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "relay_connections": relay_connections,
        "live_rooms": live_rooms,
    })))
}

/// Reconnect parameters clients should apply after a dropped socket
///
/// Endpoint: GET /api/v1/ws/client-config
pub async fn client_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(&state.config.client))
}

/// Register publish and introspection routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/notifications/{user_id}", web::post().to(push_notification))
            .route("/posts/{post_id}/replies", web::post().to(publish_reply))
            .route("/rooms/{room_id}/events", web::post().to(publish_room_event))
            .route("/ws/status/{user_id}", web::get().to(ws_status))
            .route("/ws/stats", web::get().to(ws_stats))
            .route("/ws/client-config", web::get().to(client_config)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReconnectPolicy;
    use crate::config::{ClientConfig, Config};
    use crate::relay::ClientEvent;
    use std::time::Duration;
    use crate::websocket::{Connection, OutboundFrame, PushMessage};
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_push_notification_to_live_user() {
        let state = AppState::in_memory(Config::default());
        let (conn, mut rx) = Connection::new(UserId::parse("buyer-1").unwrap());
        state.notifications.register(conn).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/notifications/buyer-1")
            .set_json(json!({
                "title": "Purchase complete",
                "message": "You now have access to Rust 101",
                "type": "success",
                "link": "/courses/rust-101"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["delivered_to"], 1);
        assert_eq!(body["user_id"], "buyer-1");
        match rx.try_recv().unwrap() {
            OutboundFrame::Text(text) => {
                assert!(matches!(
                    PushMessage::from_json(&text).unwrap(),
                    PushMessage::Notification(n) if n.title == "Purchase complete"
                ));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[actix_web::test]
    async fn test_push_notification_offline_user_delivers_zero() {
        let state = AppState::in_memory(Config::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/notifications/nobody")
            .set_json(json!({"title": "t", "message": "m", "type": "info"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["delivered_to"], 0);
    }

    #[actix_web::test]
    async fn test_push_notification_rejects_blank_title() {
        let state = AppState::in_memory(Config::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/notifications/u1")
            .set_json(json!({"title": "", "message": "m", "type": "info"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_publish_reply_and_stats() {
        let state = AppState::in_memory(Config::default());
        let (viewer, mut rx) = Connection::new(UserId::parse("viewer").unwrap());
        state.relay_connections.register(viewer.clone()).await;
        state
            .relay
            .handle(&viewer, ClientEvent::JoinPost { post_id: "42".into() })
            .await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/posts/42/replies")
            .set_json(json!({"id": "r1", "body": "Great question"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["delivered_to"], 1);
        assert!(matches!(rx.try_recv(), Ok(OutboundFrame::Text(_))));

        let req = test::TestRequest::get().uri("/api/v1/ws/stats").to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["relay_connections"], 1);
        assert_eq!(stats["live_rooms"], 1);
        assert_eq!(stats["total_connections"], 0);
    }

    #[actix_web::test]
    async fn test_room_event_requires_event_name() {
        let state = AppState::in_memory(Config::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/rooms/course:1/events")
            .set_json(json!({"event": "", "payload": {}}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_ws_status_reports_connection_count() {
        let state = AppState::in_memory(Config::default());
        for _ in 0..2 {
            let (conn, _rx) = Connection::new(UserId::parse("u1").unwrap());
            state.notifications.register(conn).await;
        }

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/ws/status/u1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["connected"], true);
        assert_eq!(body["connection_count"], 2);
    }

    #[actix_web::test]
    async fn test_client_config_advertises_reconnect_policy() {
        let mut config = Config::default();
        config.client.reconnect_attempts = 3;
        config.client.reconnect_delay_ms = 250;
        config.client.reconnect_backoff = 2.0;
        let state = AppState::in_memory(config);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/ws/client-config")
            .to_request();
        let advertised: ClientConfig = test::call_and_read_body_json(&app, req).await;
        assert_eq!(advertised, state.config.client);

        let policy = ReconnectPolicy::from(&advertised);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(500)));
    }
}
