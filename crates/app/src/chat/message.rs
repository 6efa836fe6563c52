use std::time::{SystemTime, UNIX_EPOCH};

use twin_client::Metadata;
use twin_storage::{StoredMessage, StoredRole};

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation.
///
/// Only `content` and `metadata` of the newest message ever change after it
/// was appended; `timestamp` is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    timestamp_unix_ms: u64,
    pub metadata: Option<Metadata>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_timestamp(role, content, current_unix_timestamp_ms())
    }

    pub fn with_timestamp(role: Role, content: impl Into<String>, timestamp_unix_ms: u64) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp_unix_ms,
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Empty assistant message filled in as chunks arrive.
    pub fn placeholder() -> Self {
        Self::new(Role::Assistant, String::new())
    }

    pub fn timestamp_unix_ms(&self) -> u64 {
        self.timestamp_unix_ms
    }

    pub fn to_stored(&self) -> StoredMessage {
        StoredMessage {
            role: match self.role {
                Role::User => StoredRole::User,
                Role::Assistant => StoredRole::Assistant,
            },
            content: self.content.clone(),
            timestamp_unix_ms: self.timestamp_unix_ms,
            metadata: self
                .metadata
                .as_ref()
                .and_then(|metadata| serde_json::to_value(metadata).ok()),
        }
    }

    pub fn from_stored(stored: StoredMessage) -> Self {
        let role = match stored.role {
            StoredRole::User => Role::User,
            StoredRole::Assistant => Role::Assistant,
        };
        let metadata = stored.metadata.and_then(|value| {
            serde_json::from_value::<Metadata>(value)
                .inspect_err(|error| {
                    tracing::warn!(error = %error, "discarding unreadable stored metadata");
                })
                .ok()
        });

        Self {
            role,
            content: stored.content,
            timestamp_unix_ms: stored.timestamp_unix_ms,
            metadata,
        }
    }
}

pub(crate) fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}
