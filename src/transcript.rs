//! Chat transcript — the ordered, append-only log of conversation entries.
//!
//! Entries are immutable once appended and retained for the process lifetime.
//! The dispatcher appends assistant/system entries; the frontend appends user
//! entries via `send_query`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event::{BridgeEvent, EventBroadcaster};

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One immutable chat entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only in-memory chat log with broadcast-on-append.
pub struct ChatTranscript {
    entries: RwLock<Vec<ChatEntry>>,
    events: Arc<EventBroadcaster>,
}

impl ChatTranscript {
    pub fn new(events: Arc<EventBroadcaster>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Append an entry and notify subscribers. Returns the stored entry.
    pub async fn append(&self, role: Role, text: impl Into<String>) -> ChatEntry {
        let entry = ChatEntry {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
        };
        self.entries.write().await.push(entry.clone());
        self.events
            .broadcast(BridgeEvent::EntryAppended(entry.clone()));
        entry
    }

    /// Copy of all entries in append order.
    pub async fn snapshot(&self) -> Vec<ChatEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
