use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use realtime_gateway::{
    handlers::register_routes, logging, metrics, websocket::Plane, AppState, Config,
    HeartbeatMonitor,
};
use std::sync::Arc;
use tokio::sync::broadcast;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(env = %config.app.env, "Starting realtime gateway");

    let state = AppState::in_memory(config);
    let interval = state.config.heartbeat_interval();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let notification_monitor =
        HeartbeatMonitor::new(state.notifications.clone(), interval, Plane::Notification)
            .spawn(shutdown_tx.subscribe());
    let relay_monitor =
        HeartbeatMonitor::new(state.relay_connections.clone(), interval, Plane::Relay)
            .with_cleanup(Arc::new(state.relay.clone()))
            .spawn(shutdown_tx.subscribe());
    tracing::info!(interval_secs = interval.as_secs(), "Heartbeat monitors started");

    let addr = format!("0.0.0.0:{}", state.config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/", web::get().to(|| async { "Realtime Gateway v1.0" }))
            .configure(register_routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {addr}"))?
    .run();

    let result = server.await;

    tracing::info!("HTTP server stopped, shutting down realtime gateway");
    let _ = shutdown_tx.send(());
    state.notifications.clear_all().await;
    state.relay_connections.clear_all().await;
    for monitor in [notification_monitor, relay_monitor] {
        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "heartbeat monitor task failed");
        }
    }

    result.context("HTTP server error")
}
