use std::path::Path;

use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};
use tokio::sync::oneshot;

use crate::backend::{ChatBackend, MemoryBackend};
use crate::chunk::ChatChunk;
use crate::config::ClientConfig;
use crate::error::{
    BuildClientSnafu, ClientError, ClientResult, DecodeSnafu, EmptyMessageSnafu, HttpStatusSnafu,
    ReadFileSnafu, TransportSnafu,
};
use crate::sse::SseDecoder;
use crate::stream::{BoxFuture, ChatStreamHandle, ChatStreamWorker, ChunkSink, chunk_channel};
use crate::types::{
    Acknowledgement, ChatRequest, H3Log, HealthStatus, MemoryQuery, MemoryQueryResult,
    MemoryStats, TrainReport, TrainRequest, UploadReceipt,
};

pub const CHAT_PATH: &str = "/api/chat/send";
pub const HEALTH_PATH: &str = "/api/health";
pub const UPLOAD_PATH: &str = "/api/upload";
pub const TRAIN_PATH: &str = "/api/train";
pub const MEMORY_STATS_PATH: &str = "/api/memory/stats";
pub const MEMORY_QUERY_PATH: &str = "/api/memory/query";
pub const MEMORY_CLEAR_PATH: &str = "/api/memory/clear";
pub const H3_UPDATE_PATH: &str = "/api/h3/update";

const EVENT_STREAM: &str = "text/event-stream";
const UPLOAD_FIELD: &str = "file";

/// reqwest-backed client for the assistant backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: ClientConfig,
    client: Client,
}

enum Flow {
    Continue,
    Stop,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context(BuildClientSnafu {
                stage: "build-http-client",
            })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn execute<T>(
        &self,
        builder: RequestBuilder,
        url: &str,
        stage: &'static str,
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let timeout = self.config.request_timeout;
        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| ClientError::from_send(stage, url, timeout, source))?;

        let payload = Self::read_success_body(response, stage).await?;
        serde_json::from_str(&payload).context(DecodeSnafu { stage })
    }

    async fn read_success_body(response: Response, stage: &'static str) -> ClientResult<String> {
        let status = response.status();
        let body = response.text().await.context(TransportSnafu { stage })?;

        if !status.is_success() {
            return HttpStatusSnafu {
                stage,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(body)
    }

    async fn open_chat(
        client: &Client,
        config: &ClientConfig,
        request: &ChatRequest,
    ) -> ClientResult<Response> {
        let url = config.endpoint(CHAT_PATH);
        let response = client
            .post(&url)
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .json(request)
            .send()
            .await
            .map_err(|source| {
                ClientError::from_send("open-chat-stream", &url, config.connect_timeout, source)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return HttpStatusSnafu {
                stage: "chat-stream-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(response)
    }

    fn forward_payload(sink: &ChunkSink, payload: &str) -> Flow {
        match ChatChunk::decode(payload) {
            Ok(Some(chunk)) => {
                let terminal = chunk.is_terminal();
                if !sink.send(Ok(chunk)) || terminal {
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Ok(None) => Flow::Continue,
            Err(error) => {
                tracing::warn!(error = %error, payload_len = payload.len(), "skipping malformed chat chunk");
                Flow::Continue
            }
        }
    }

    async fn run_chat_worker(
        client: Client,
        config: ClientConfig,
        request: ChatRequest,
        sink: ChunkSink,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let opened = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!("chat stream cancelled before the backend answered");
                return;
            }
            opened = Self::open_chat(&client, &config, &request) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    base_url = %config.base_url,
                    stage = error.stage(),
                    error = %error,
                    "failed to open chat stream"
                );
                sink.send(Err(error));
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut chunk_count = 0usize;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // Dropping the body here releases the connection.
                    tracing::debug!(chunk_count, "chat stream cancelled");
                    return;
                }
                next = body.next() => {
                    match next {
                        Some(Ok(bytes)) => {
                            for payload in decoder.push(&bytes) {
                                chunk_count += 1;
                                if let Flow::Stop = Self::forward_payload(&sink, &payload) {
                                    tracing::debug!(chunk_count, "chat stream finished");
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            tracing::warn!(chunk_count, error = %source, "chat stream dropped mid-response");
                            sink.send(Err(ClientError::Transport {
                                stage: "read-chat-stream",
                                source,
                            }));
                            return;
                        }
                        None => {
                            if let Some(payload) = decoder.finish() {
                                chunk_count += 1;
                                Self::forward_payload(&sink, &payload);
                            }
                            tracing::debug!(chunk_count, "chat stream closed by backend");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn upload(&self, path: &Path) -> ClientResult<UploadReceipt> {
        let data = tokio::fs::read(path).await.context(ReadFileSnafu {
            stage: "read-upload-file",
            path: path.to_path_buf(),
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        tracing::info!(file_name = %file_name, size_bytes = data.len(), "uploading file");

        let form = Form::new().part(UPLOAD_FIELD, Part::bytes(data).file_name(file_name));
        let url = self.config.endpoint(UPLOAD_PATH);
        self.execute(self.client.post(&url).multipart(form), &url, "upload-file")
            .await
    }
}

impl ChatBackend for HttpBackend {
    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn stream_chat(&self, request: ChatRequest) -> ClientResult<ChatStreamHandle> {
        ensure!(
            !request.message.trim().is_empty(),
            EmptyMessageSnafu {
                stage: "stream-chat",
            }
        );

        let (sink, stream, cancel_rx) = chunk_channel();
        let worker: ChatStreamWorker = Box::pin(Self::run_chat_worker(
            self.client.clone(),
            self.config.clone(),
            request,
            sink,
            cancel_rx,
        ));

        Ok(ChatStreamHandle { stream, worker })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, ClientResult<HealthStatus>> {
        Box::pin(async move {
            let url = self.config.endpoint(HEALTH_PATH);
            self.execute(self.client.get(&url), &url, "health-check")
                .await
        })
    }
}

impl MemoryBackend for HttpBackend {
    fn upload_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, ClientResult<UploadReceipt>> {
        Box::pin(self.upload(path))
    }

    fn train<'a>(&'a self, file_paths: Vec<String>) -> BoxFuture<'a, ClientResult<TrainReport>> {
        Box::pin(async move {
            let url = self.config.endpoint(TRAIN_PATH);
            let body = TrainRequest { file_paths };
            self.execute(self.client.post(&url).json(&body), &url, "train-memory")
                .await
        })
    }

    fn memory_stats<'a>(&'a self) -> BoxFuture<'a, ClientResult<MemoryStats>> {
        Box::pin(async move {
            let url = self.config.endpoint(MEMORY_STATS_PATH);
            self.execute(self.client.get(&url), &url, "memory-stats")
                .await
        })
    }

    fn query_memory<'a>(
        &'a self,
        query: MemoryQuery,
    ) -> BoxFuture<'a, ClientResult<MemoryQueryResult>> {
        Box::pin(async move {
            let url = self.config.endpoint(MEMORY_QUERY_PATH);
            self.execute(self.client.post(&url).json(&query), &url, "query-memory")
                .await
        })
    }

    fn clear_memory<'a>(&'a self) -> BoxFuture<'a, ClientResult<Acknowledgement>> {
        Box::pin(async move {
            let url = self.config.endpoint(MEMORY_CLEAR_PATH);
            self.execute(self.client.delete(&url), &url, "clear-memory")
                .await
        })
    }

    fn log_h3<'a>(&'a self, log: H3Log) -> BoxFuture<'a, ClientResult<Acknowledgement>> {
        Box::pin(async move {
            let url = self.config.endpoint(H3_UPDATE_PATH);
            self.execute(self.client.post(&url).json(&log), &url, "log-h3")
                .await
        })
    }
}
