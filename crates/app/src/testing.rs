//! In-process backend used by unit tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use twin_client::{
    Acknowledgement, BoxFuture, ChatBackend, ChatChunk, ChatRequest, ChatStreamHandle,
    ChatStreamWorker, ClientError, ClientResult, H3Log, HealthStatus, MemoryBackend, MemoryHit,
    MemoryQuery, MemoryQueryResult, MemoryStats, TrainReport, UploadReceipt, chunk_channel,
    scripted_stream,
};

pub(crate) enum StubExchange {
    /// Replays the items, then closes the stream cleanly.
    Scripted(Vec<ClientResult<ChatChunk>>),
    /// Never yields anything until the reader cancels.
    Stalled,
    /// Ignores cancellation and never finishes on its own.
    Unresponsive,
    /// `stream_chat` itself fails.
    Refused(ClientError),
}

#[derive(Default)]
pub(crate) struct StubBackend {
    health: Option<String>,
    exchanges: Mutex<VecDeque<StubExchange>>,
    requests: Mutex<Vec<ChatRequest>>,
    stalled_cancelled: Arc<AtomicBool>,
    trained: Mutex<Vec<Vec<String>>>,
    h3_logs: Mutex<Vec<H3Log>>,
    total_documents: u64,
}

pub(crate) fn server_error(status: u16) -> ClientError {
    ClientError::HttpStatus {
        stage: "stub",
        status,
        body: "stub failure".to_string(),
    }
}

impl StubBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_health(mut self, status: &str) -> Self {
        self.health = Some(status.to_string());
        self
    }

    pub(crate) fn with_documents(mut self, total_documents: u64) -> Self {
        self.total_documents = total_documents;
        self
    }

    pub(crate) fn with_exchange(self, exchange: StubExchange) -> Self {
        self.exchanges.lock().unwrap().push_back(exchange);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn stalled_cancelled(&self) -> bool {
        self.stalled_cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn trained(&self) -> Vec<Vec<String>> {
        self.trained.lock().unwrap().clone()
    }

    pub(crate) fn h3_logs(&self) -> Vec<H3Log> {
        self.h3_logs.lock().unwrap().clone()
    }
}

impl ChatBackend for StubBackend {
    fn base_url(&self) -> &str {
        "stub://backend"
    }

    fn stream_chat(&self, request: ChatRequest) -> ClientResult<ChatStreamHandle> {
        self.requests.lock().unwrap().push(request);
        let exchange = self
            .exchanges
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StubExchange::Scripted(Vec::new()));

        match exchange {
            StubExchange::Scripted(items) => Ok(scripted_stream(items)),
            StubExchange::Refused(error) => Err(error),
            StubExchange::Unresponsive => {
                let (sink, stream, cancel_rx) = chunk_channel();
                let worker: ChatStreamWorker = Box::pin(async move {
                    let _held = (sink, cancel_rx);
                    std::future::pending::<()>().await;
                });
                Ok(ChatStreamHandle { stream, worker })
            }
            StubExchange::Stalled => {
                let (sink, stream, cancel_rx) = chunk_channel();
                let cancelled = Arc::clone(&self.stalled_cancelled);
                let worker: ChatStreamWorker = Box::pin(async move {
                    let _sink = sink;
                    if cancel_rx.await.is_ok() {
                        cancelled.store(true, Ordering::SeqCst);
                    }
                });
                Ok(ChatStreamHandle { stream, worker })
            }
        }
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, ClientResult<HealthStatus>> {
        Box::pin(async move {
            match &self.health {
                Some(status) => Ok(HealthStatus {
                    status: status.clone(),
                }),
                None => Err(server_error(503)),
            }
        })
    }
}

impl MemoryBackend for StubBackend {
    fn upload_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, ClientResult<UploadReceipt>> {
        Box::pin(async move {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(UploadReceipt {
                success: true,
                file_path: format!("uploads/{filename}"),
                filename,
            })
        })
    }

    fn train<'a>(&'a self, file_paths: Vec<String>) -> BoxFuture<'a, ClientResult<TrainReport>> {
        Box::pin(async move {
            let total = file_paths.len() as u64;
            self.trained.lock().unwrap().push(file_paths);
            Ok(TrainReport {
                total,
                success: total,
                failed: 0,
                details: Vec::new(),
            })
        })
    }

    fn memory_stats<'a>(&'a self) -> BoxFuture<'a, ClientResult<MemoryStats>> {
        Box::pin(async move {
            Ok(MemoryStats {
                total_documents: self.total_documents,
                collection_name: "digital_twin_memory".to_string(),
                persist_directory: "./chroma_db".to_string(),
            })
        })
    }

    fn query_memory<'a>(
        &'a self,
        query: MemoryQuery,
    ) -> BoxFuture<'a, ClientResult<MemoryQueryResult>> {
        Box::pin(async move {
            let results = (0..query.n_results)
                .map(|index| MemoryHit {
                    content: format!("{} #{index}", query.query),
                    metadata: serde_json::Map::new(),
                    distance: Some(f64::from(index) / 10.0),
                })
                .collect::<Vec<_>>();
            Ok(MemoryQueryResult {
                success: true,
                count: results.len() as u64,
                results,
            })
        })
    }

    fn clear_memory<'a>(&'a self) -> BoxFuture<'a, ClientResult<Acknowledgement>> {
        Box::pin(async move {
            Ok(Acknowledgement {
                success: true,
                message: Some("memory cleared".to_string()),
                error: None,
            })
        })
    }

    fn log_h3<'a>(&'a self, log: H3Log) -> BoxFuture<'a, ClientResult<Acknowledgement>> {
        Box::pin(async move {
            self.h3_logs.lock().unwrap().push(log);
            Ok(Acknowledgement {
                success: true,
                message: None,
                error: None,
            })
        })
    }
}
