use std::path::{Path, PathBuf};

use snafu::{ResultExt, ensure};

use crate::HistoryStore;
use crate::error::{
    CreateDirectorySnafu, HistoryResult, ParseHistorySnafu, ReadHistorySnafu,
    RenameTempFileSnafu, SerializeHistorySnafu, UnsupportedVersionSnafu, WriteHistorySnafu,
};
use crate::types::{HISTORY_FORMAT_VERSION, HistoryDocument, StoredMessage};

/// Conversation history kept as one JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonHistoryStore {
    fn load(&self) -> HistoryResult<Vec<StoredMessage>> {
        if !self.path.exists() {
            tracing::info!(path = ?self.path, "no history file found, starting empty");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).context(ReadHistorySnafu {
            stage: "read-history-file",
            path: self.path.clone(),
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: HistoryDocument =
            serde_json::from_str(&content).context(ParseHistorySnafu {
                stage: "parse-history-file",
                path: self.path.clone(),
            })?;
        ensure!(
            document.version == HISTORY_FORMAT_VERSION,
            UnsupportedVersionSnafu {
                stage: "check-history-version",
                path: self.path.clone(),
                version: document.version,
            }
        );

        tracing::debug!(
            path = ?self.path,
            message_count = document.messages.len(),
            "loaded conversation history"
        );
        Ok(document.messages)
    }

    fn save(&self, messages: &[StoredMessage]) -> HistoryResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirectorySnafu {
                stage: "create-history-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let document = HistoryDocument {
            version: HISTORY_FORMAT_VERSION,
            messages: messages.to_vec(),
        };
        let content = serde_json::to_string_pretty(&document).context(SerializeHistorySnafu {
            stage: "serialize-history",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteHistorySnafu {
            stage: "write-temporary-history-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameTempFileSnafu {
            stage: "rename-temporary-history-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        tracing::debug!(path = ?self.path, message_count = messages.len(), "saved conversation history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use crate::types::StoredRole;

    fn message(role: StoredRole, content: &str, timestamp_unix_ms: u64) -> StoredMessage {
        StoredMessage {
            role,
            content: content.to_string(),
            timestamp_unix_ms,
            metadata: None,
        }
    }

    #[test]
    fn missing_file_loads_as_empty_history() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(directory.path().join("history.json"));

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn saved_history_is_reloaded_in_order() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(directory.path().join("nested/history.json"));
        let mut reply = message(StoredRole::Assistant, "Hello", 2);
        reply.metadata = Some(serde_json::json!({ "strategies": ["mentor"] }));
        let messages = vec![message(StoredRole::User, "Hi", 1), reply];

        store.save(&messages).unwrap();

        assert_eq!(store.load().unwrap(), messages);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("history.json");
        std::fs::write(&path, r#"{"version":9,"messages":[]}"#).unwrap();

        let error = JsonHistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(error, HistoryError::UnsupportedVersion { version: 9, .. }));
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let error = JsonHistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(error, HistoryError::ParseHistory { .. }));
    }
}
