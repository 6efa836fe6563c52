use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HistoryError {
    #[snafu(display("failed to create history directory at {path:?} on `{stage}`"))]
    CreateDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read history from {path:?} on `{stage}`"))]
    ReadHistory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse history at {path:?} on `{stage}`: {source}"))]
    ParseHistory {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("history at {path:?} has unsupported version {version}"))]
    UnsupportedVersion {
        stage: &'static str,
        path: PathBuf,
        version: u32,
    },
    #[snafu(display("failed to serialize history on `{stage}`: {source}"))]
    SerializeHistory {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write history file at {path:?} on `{stage}`"))]
    WriteHistory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace history file from {from:?} to {to:?} on `{stage}`"))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type HistoryResult<T> = Result<T, HistoryError>;
