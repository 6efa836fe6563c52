use serde::{Deserialize, Serialize};

/// Current on-disk history layout.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

/// Storage-local message role, intentionally decoupled from chat-layer enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: StoredRole,
    pub content: String,
    pub timestamp_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HistoryDocument {
    pub version: u32,
    pub messages: Vec<StoredMessage>,
}
