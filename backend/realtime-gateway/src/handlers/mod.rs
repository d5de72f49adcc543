/// HTTP handlers for the realtime gateway API
pub mod publish;
pub mod websocket;

use actix_web::web;

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    websocket::register_routes(cfg);
    publish::register_routes(cfg);
}
