use std::path::PathBuf;
use std::time::Duration;

use snafu::Snafu;

/// Coarse failure classification surfaced to the chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request could not be established or the connection dropped.
    Connection,
    /// The bounded wait elapsed before the exchange finished.
    Timeout,
    /// The backend answered, but with a failure status or an unreadable body.
    Server,
    /// The exchange was cancelled locally.
    Aborted,
    /// A local precondition failed before anything was sent.
    Local,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("could not reach backend at {url} on `{stage}`: {source}"))]
    Connect {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("backend did not answer within {timeout_ms}ms on `{stage}`"))]
    Timeout { stage: &'static str, timeout_ms: u64 },
    #[snafu(display("connection to backend dropped on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("backend returned status {status} on `{stage}`: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode backend payload on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("exchange was aborted on `{stage}`"))]
    Aborted { stage: &'static str },
    #[snafu(display("failed to read upload file {path:?} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("chat message is empty"))]
    EmptyMessage { stage: &'static str },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connect { .. } | Self::Transport { .. } => FailureKind::Connection,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::HttpStatus { .. } | Self::Decode { .. } => FailureKind::Server,
            Self::Aborted { .. } => FailureKind::Aborted,
            Self::BuildClient { .. } | Self::ReadFile { .. } | Self::EmptyMessage { .. } => {
                FailureKind::Local
            }
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::BuildClient { stage, .. }
            | Self::Connect { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::Transport { stage, .. }
            | Self::HttpStatus { stage, .. }
            | Self::Decode { stage, .. }
            | Self::Aborted { stage }
            | Self::ReadFile { stage, .. }
            | Self::EmptyMessage { stage } => stage,
        }
    }

    /// Maps a reqwest failure raised while sending a request.
    ///
    /// A connect timeout means the backend was never reached, so it is a
    /// connection failure rather than a timeout.
    pub(crate) fn from_send(
        stage: &'static str,
        url: &str,
        timeout: Duration,
        source: reqwest::Error,
    ) -> Self {
        if is_response_timeout(source.is_connect(), source.is_timeout()) {
            Self::Timeout {
                stage,
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            Self::Connect {
                stage,
                url: url.to_string(),
                source,
            }
        }
    }
}

fn is_response_timeout(is_connect: bool, is_timeout: bool) -> bool {
    is_timeout && !is_connect
}
