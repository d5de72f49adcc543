/// Chat persistence seam
///
/// In-band chat messages are persisted before they are relayed, so a late joiner
/// that loads history separately sees the same messages the room saw live.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::events::RoomId;
use crate::error::{AppError, AppResult};
use crate::models::ChatMessage;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a message and return the stored record
    async fn save_message(&self, message: ChatMessage) -> AppResult<ChatMessage>;

    /// Most recent messages of a room, oldest first
    async fn history(&self, room: &RoomId, limit: usize) -> AppResult<Vec<ChatMessage>>;
}

/// Process-local store used by default and in tests
#[derive(Clone, Default)]
pub struct InMemoryChatStore {
    messages: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
    capacity_per_room: Option<usize>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` messages per room, dropping the oldest
    pub fn with_capacity_per_room(capacity: usize) -> Self {
        Self {
            capacity_per_room: Some(capacity),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn save_message(&self, message: ChatMessage) -> AppResult<ChatMessage> {
        if message.text.trim().is_empty() {
            return Err(AppError::Store("refusing to store empty message".into()));
        }

        let mut guard = self.messages.write().await;
        let room = guard.entry(message.room_id.clone()).or_default();
        room.push(message.clone());
        if let Some(capacity) = self.capacity_per_room {
            if room.len() > capacity {
                let overflow = room.len() - capacity;
                room.drain(..overflow);
            }
        }
        Ok(message)
    }

    async fn history(&self, room: &RoomId, limit: usize) -> AppResult<Vec<ChatMessage>> {
        let guard = self.messages.read().await;
        let messages = guard.get(room.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
