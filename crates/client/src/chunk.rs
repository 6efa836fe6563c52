use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{ClientResult, DecodeSnafu};
use crate::metadata::Metadata;

const UNKNOWN_ERROR_DESCRIPTION: &str = "backend reported an unspecified error";

/// One discrete unit of an incrementally delivered chat reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatChunk {
    /// Opening marker; identifiers are informational only.
    Start {
        message_id: Option<String>,
        conversation_id: Option<String>,
    },
    /// Text fragment to append to the assistant message.
    Content(String),
    /// Metadata to merge into the assistant message.
    Meta(Metadata),
    /// Error reported by the backend mid-stream.
    Error(String),
    /// Terminal marker; nothing meaningful follows it.
    Done,
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

impl ChatChunk {
    /// Decodes one `data` payload. Unknown chunk types yield `Ok(None)`.
    pub fn decode(payload: &str) -> ClientResult<Option<Self>> {
        let raw: RawChunk = serde_json::from_str(payload).context(DecodeSnafu {
            stage: "decode-chat-chunk",
        })?;

        let chunk = match raw.kind.as_str() {
            "start" => Self::Start {
                message_id: raw.message_id,
                conversation_id: raw.conversation_id,
            },
            "content" => Self::Content(raw.content.unwrap_or_default()),
            "meta" => Self::Meta(raw.metadata.unwrap_or_default()),
            "error" => Self::Error(error_description(raw.error, raw.content, raw.message)),
            "done" => Self::Done,
            other => {
                tracing::debug!(chunk_type = %other, "ignoring unknown chat chunk type");
                return Ok(None);
            }
        };

        Ok(Some(chunk))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

fn error_description(
    error: Option<String>,
    content: Option<String>,
    message: Option<serde_json::Value>,
) -> String {
    error
        .or(content)
        .or_else(|| message.and_then(|value| value.as_str().map(str::to_string)))
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR_DESCRIPTION.to_string())
}
