use std::path::Path;

use crate::error::ClientResult;
use crate::stream::{BoxFuture, ChatStreamHandle};
use crate::types::{
    Acknowledgement, ChatRequest, H3Log, HealthStatus, MemoryQuery, MemoryQueryResult,
    MemoryStats, TrainReport, UploadReceipt,
};

/// Chat side of the assistant backend.
pub trait ChatBackend: Send + Sync {
    fn base_url(&self) -> &str;

    /// Opens one streaming exchange. Nothing is sent until the worker runs.
    fn stream_chat(&self, request: ChatRequest) -> ClientResult<ChatStreamHandle>;

    fn health<'a>(&'a self) -> BoxFuture<'a, ClientResult<HealthStatus>>;
}

/// File upload and memory management endpoints.
pub trait MemoryBackend: Send + Sync {
    fn upload_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, ClientResult<UploadReceipt>>;

    fn train<'a>(&'a self, file_paths: Vec<String>) -> BoxFuture<'a, ClientResult<TrainReport>>;

    fn memory_stats<'a>(&'a self) -> BoxFuture<'a, ClientResult<MemoryStats>>;

    fn query_memory<'a>(&'a self, query: MemoryQuery)
    -> BoxFuture<'a, ClientResult<MemoryQueryResult>>;

    fn clear_memory<'a>(&'a self) -> BoxFuture<'a, ClientResult<Acknowledgement>>;

    fn log_h3<'a>(&'a self, log: H3Log) -> BoxFuture<'a, ClientResult<Acknowledgement>>;
}
