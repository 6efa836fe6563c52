//! HTTP client for the digital-twin assistant backend.
//!
//! The chat endpoint answers with a server-sent event stream of typed chunks;
//! [`ChatBackend::stream_chat`] turns one request into a [`ChunkStream`] plus a
//! worker future that owns the connection.

mod backend;
mod chunk;
mod config;
mod error;
mod http;
mod metadata;
mod sse;
mod stream;
mod types;

pub use backend::{ChatBackend, MemoryBackend};
pub use chunk::ChatChunk;
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ClientError, ClientResult, FailureKind};
pub use http::{
    CHAT_PATH, H3_UPDATE_PATH, HEALTH_PATH, HttpBackend, MEMORY_CLEAR_PATH, MEMORY_QUERY_PATH,
    MEMORY_STATS_PATH, TRAIN_PATH, UPLOAD_PATH,
};
pub use metadata::{Metadata, MetadataValue, STRATEGIES_KEY};
pub use sse::SseDecoder;
pub use stream::{
    BoxFuture, ChatStreamHandle, ChatStreamWorker, ChunkSink, ChunkStream, chunk_channel,
    scripted_stream,
};
pub use types::{
    Acknowledgement, ChatContext, ChatRequest, DEFAULT_H3_LEVEL, H3Log, H3State, HealthStatus,
    MemoryHit, MemoryQuery, MemoryQueryResult, MemoryStats, TrainReport, TrainRequest,
    UploadReceipt,
};
