use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::{ResultExt, Snafu, ensure};
use twin_client::{
    Acknowledgement, ClientError, H3Log, H3State, MemoryBackend, MemoryQuery, MemoryQueryResult,
    MemoryStats, TrainReport, UploadReceipt,
};

pub const DEFAULT_QUERY_RESULTS: u32 = 5;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MemoryPanelError {
    #[snafu(display("memory request failed on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: ClientError,
    },
    #[snafu(display("backend rejected upload of {filename} on `{stage}`"))]
    UploadRejected {
        stage: &'static str,
        filename: String,
    },
    #[snafu(display("memory query is empty on `{stage}`"))]
    EmptyQuery { stage: &'static str },
}

pub type MemoryPanelResult<T> = Result<T, MemoryPanelError>;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedUpload {
    pub receipt: UploadReceipt,
    pub report: TrainReport,
}

/// Knowledge-base actions: upload, train, stats, query and clear.
pub struct MemoryPanel {
    backend: Arc<dyn MemoryBackend>,
    document_count: AtomicU64,
}

impl MemoryPanel {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            document_count: AtomicU64::new(0),
        }
    }

    /// Last document count seen by [`refresh_stats`](Self::refresh_stats).
    pub fn document_count(&self) -> u64 {
        self.document_count.load(Ordering::Acquire)
    }

    pub async fn upload(&self, path: &Path) -> MemoryPanelResult<UploadReceipt> {
        let receipt = self
            .backend
            .upload_file(path)
            .await
            .context(BackendSnafu {
                stage: "upload-file",
            })?;
        ensure!(
            receipt.success,
            UploadRejectedSnafu {
                stage: "check-upload-receipt",
                filename: receipt.filename.clone(),
            }
        );

        tracing::info!(filename = %receipt.filename, file_path = %receipt.file_path, "uploaded file");
        Ok(receipt)
    }

    /// Uploads one file and feeds it to the backend's memory.
    pub async fn upload_and_train(&self, path: &Path) -> MemoryPanelResult<TrainedUpload> {
        let receipt = self.upload(path).await?;
        let report = self
            .backend
            .train(vec![receipt.file_path.clone()])
            .await
            .context(BackendSnafu {
                stage: "train-uploaded-file",
            })?;

        tracing::info!(
            total = report.total,
            success = report.success,
            failed = report.failed,
            "trained memory from upload"
        );
        Ok(TrainedUpload { receipt, report })
    }

    pub async fn refresh_stats(&self) -> MemoryPanelResult<MemoryStats> {
        let stats = self.backend.memory_stats().await.context(BackendSnafu {
            stage: "refresh-memory-stats",
        })?;
        self.document_count
            .store(stats.total_documents, Ordering::Release);
        Ok(stats)
    }

    pub async fn query(&self, text: &str, n_results: u32) -> MemoryPanelResult<MemoryQueryResult> {
        let text = text.trim();
        ensure!(!text.is_empty(), EmptyQuerySnafu { stage: "query-memory" });

        let query = MemoryQuery {
            query: text.to_string(),
            n_results: n_results.max(1),
        };
        self.backend.query_memory(query).await.context(BackendSnafu {
            stage: "query-memory",
        })
    }

    pub async fn clear(&self) -> MemoryPanelResult<Acknowledgement> {
        let acknowledgement = self.backend.clear_memory().await.context(BackendSnafu {
            stage: "clear-memory",
        })?;
        if acknowledgement.success {
            self.document_count.store(0, Ordering::Release);
        } else {
            tracing::warn!(error = ?acknowledgement.error, "backend refused to clear memory");
        }
        Ok(acknowledgement)
    }

    /// Records an H3 calibration point with a free-form note.
    pub async fn log_h3(&self, state: H3State, note: &str) -> MemoryPanelResult<Acknowledgement> {
        let log = H3Log {
            state,
            note: note.trim().to_string(),
        };
        self.backend.log_h3(log).await.context(BackendSnafu {
            stage: "log-h3-state",
        })
    }
}
