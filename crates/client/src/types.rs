use serde::{Deserialize, Serialize};

/// Neutral value for every H3 dimension.
pub const DEFAULT_H3_LEVEL: u8 = 5;

/// Four-dimensional self-assessment sent alongside every chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct H3State {
    pub mind: u8,
    pub body: u8,
    pub spirit: u8,
    pub vocation: u8,
}

impl Default for H3State {
    fn default() -> Self {
        Self {
            mind: DEFAULT_H3_LEVEL,
            body: DEFAULT_H3_LEVEL,
            spirit: DEFAULT_H3_LEVEL,
            vocation: DEFAULT_H3_LEVEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatContext {
    pub h3_state: H3State,
}

/// Body of `POST /api/chat/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub context: ChatContext,
    pub stream: bool,
}

impl ChatRequest {
    pub fn streaming(message: impl Into<String>, h3_state: H3State) -> Self {
        Self {
            message: message.into(),
            context: ChatContext { h3_state },
            stream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        let status = self.status.trim();
        status.eq_ignore_ascii_case("ok") || status.eq_ignore_ascii_case("healthy")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub success: bool,
    pub file_path: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainRequest {
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainReport {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemoryStats {
    pub total_documents: u64,
    pub collection_name: String,
    pub persist_directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryQuery {
    pub query: String,
    pub n_results: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemoryHit {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemoryQueryResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<MemoryHit>,
    #[serde(default)]
    pub count: u64,
}

/// Generic `{ success, message, error }` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct H3Log {
    #[serde(flatten)]
    pub state: H3State,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_matches_backend_shape() {
        let request = ChatRequest::streaming("hello", H3State::default());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "message": "hello",
                "context": { "h3_state": { "mind": 5, "body": 5, "spirit": 5, "vocation": 5 } },
                "stream": true
            })
        );
    }

    #[test]
    fn health_accepts_ok_and_healthy() {
        let ok: HealthStatus = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        let healthy: HealthStatus = serde_json::from_str(r#"{"status":"healthy"}"#).unwrap();
        let degraded: HealthStatus = serde_json::from_str(r#"{"status":"degraded"}"#).unwrap();

        assert!(ok.is_healthy());
        assert!(healthy.is_healthy());
        assert!(!degraded.is_healthy());
    }

    #[test]
    fn h3_log_flattens_state() {
        let log = H3Log {
            state: H3State {
                mind: 7,
                ..H3State::default()
            },
            note: "slept well".to_string(),
        };

        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["mind"], 7);
        assert_eq!(value["note"], "slept well");
    }
}
