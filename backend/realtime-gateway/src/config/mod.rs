use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub websocket: WebSocketConfig,
    pub client: ClientConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Seconds between heartbeat sweeps
    pub heartbeat_interval_secs: u64,
    /// Largest inbound text frame accepted on the relay plane
    pub max_frame_bytes: usize,
}

/// Reconnect contract handed to consumers of the relay and notification channels
///
/// Served at `GET /api/v1/ws/client-config`; clients turn it into a `ReconnectPolicy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub reconnect_backoff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages kept per room by the in-process chat store
    pub history_per_room: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig {
                env: "development".to_string(),
                port: 8000,
            },
            websocket: WebSocketConfig {
                heartbeat_interval_secs: 30,
                max_frame_bytes: 256_000,
            },
            client: ClientConfig {
                reconnect_attempts: 5,
                reconnect_delay_ms: 1000,
                reconnect_backoff: 1.0,
            },
            chat: ChatConfig {
                history_per_room: 500,
            },
        }
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; missing keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            app: AppConfig {
                env: lookup("APP_ENV").unwrap_or(defaults.app.env),
                port: parse_or(&lookup, "APP_PORT", defaults.app.port)?,
            },
            websocket: WebSocketConfig {
                heartbeat_interval_secs: parse_or(
                    &lookup,
                    "HEARTBEAT_INTERVAL_SECS",
                    defaults.websocket.heartbeat_interval_secs,
                )?,
                max_frame_bytes: parse_or(
                    &lookup,
                    "WS_MAX_FRAME_BYTES",
                    defaults.websocket.max_frame_bytes,
                )?,
            },
            client: ClientConfig {
                reconnect_attempts: parse_or(
                    &lookup,
                    "CLIENT_RECONNECT_ATTEMPTS",
                    defaults.client.reconnect_attempts,
                )?,
                reconnect_delay_ms: parse_or(
                    &lookup,
                    "CLIENT_RECONNECT_DELAY_MS",
                    defaults.client.reconnect_delay_ms,
                )?,
                reconnect_backoff: parse_or(
                    &lookup,
                    "CLIENT_RECONNECT_BACKOFF",
                    defaults.client.reconnect_backoff,
                )?,
            },
            chat: ChatConfig {
                history_per_room: parse_or(
                    &lookup,
                    "CHAT_HISTORY_PER_ROOM",
                    defaults.chat.history_per_room,
                )?,
            },
        };

        if config.websocket.heartbeat_interval_secs == 0 {
            return Err(AppError::Config(
                "HEARTBEAT_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        if config.chat.history_per_room == 0 {
            return Err(AppError::Config(
                "CHAT_HISTORY_PER_ROOM must be greater than zero".into(),
            ));
        }
        if config.client.reconnect_backoff < 1.0 {
            return Err(AppError::Config(
                "CLIENT_RECONNECT_BACKOFF must be at least 1.0".into(),
            ));
        }

        Ok(config)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.websocket.heartbeat_interval_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
