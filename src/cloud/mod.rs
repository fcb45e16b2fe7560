//! Cloud status store - Firebase Realtime Database over REST.
//!
//! This module provides:
//! - `StatusStore` trait: read, write and subscribe to a key
//! - `FirebaseClient`: REST + server-sent-events implementation
//! - `MemoryStore`: in-process store for tests and offline runs
//! - Stream event parsing and authentication helpers

pub mod auth;
pub mod firebase;
pub mod memory;
pub mod stream;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;

pub use auth::AuthConfig;
pub use firebase::FirebaseClient;
pub use memory::MemoryStore;
pub use stream::{StreamEvent, parse_stream_event};

/// A change observed under a subscribed key.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Path relative to the subscribed key ("/" for the key itself)
    pub path: String,
    /// New data at `path`; `Null` when deleted
    pub data: Value,
}

impl Change {
    pub fn root(data: Value) -> Self {
        Self {
            path: "/".to_string(),
            data,
        }
    }

    /// True when the change replaces the subscribed key itself.
    pub fn is_root(&self) -> bool {
        self.path == "/" || self.path.is_empty()
    }
}

/// Stream of changes; the first item carries the value at subscribe time.
pub type ChangeStream = BoxStream<'static, Result<Change>>;

/// Key-value store with change notification.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Current value at a key, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value at a key
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Subscribe to changes under a key
    async fn subscribe(&self, key: &str) -> Result<ChangeStream>;
}

/// Normalise "robot/status", "/robot/status/" etc. to "robot/status".
pub fn normalize_key(key: &str) -> String {
    key.trim_matches('/').to_string()
}
