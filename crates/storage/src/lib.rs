pub mod error;
pub mod file;
pub mod types;

use std::sync::{Mutex, PoisonError};

pub use error::{HistoryError, HistoryResult};
pub use file::JsonHistoryStore;
pub use types::{HISTORY_FORMAT_VERSION, StoredMessage, StoredRole};

/// Persistence seam used to rehydrate a conversation at start-up.
pub trait HistoryStore: Send + Sync {
    fn load(&self) -> HistoryResult<Vec<StoredMessage>>;
    fn save(&self, messages: &[StoredMessage]) -> HistoryResult<()>;
}

/// Process-local history; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    messages: Mutex<Vec<StoredMessage>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<StoredMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn load(&self) -> HistoryResult<Vec<StoredMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, messages: &[StoredMessage]) -> HistoryResult<()> {
        *self.messages.lock().unwrap_or_else(PoisonError::into_inner) = messages.to_vec();
        Ok(())
    }
}
