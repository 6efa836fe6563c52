use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::time::Instant;
use twin_client::{
    ChatBackend, ChatChunk, ChatRequest, ChatStreamHandle, ChunkStream, ClientError, ClientResult,
    FailureKind, H3State,
};
use twin_storage::HistoryStore;

use super::message::Message;
use super::store::ConversationStore;
use crate::connection::ConnectionMonitor;

pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(120);

pub const CONNECTION_NOTE: &str =
    "Unable to reach the assistant backend. Check that it is running and try again.";
pub const TIMEOUT_NOTE: &str = "The assistant took too long to respond. Please retry later.";
pub const ABORTED_NOTE: &str = "The response was interrupted.";
pub const RECONNECTED_NOTE: &str = "Connection to the assistant backend restored.";
pub const EMPTY_REPLY_NOTE: &str = "The assistant returned an empty reply.";
/// How long a cancelled worker may take to release its connection before it is aborted.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SERVER_NOTE_PREFIX: &str = "The assistant backend returned an error: ";
const LOCAL_NOTE_PREFIX: &str = "The message could not be sent: ";

/// Why a send or retry was refused before touching the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    /// An exchange is still streaming.
    Busy,
    /// The input is empty or whitespace only.
    EmptyInput,
}

impl fmt::Display for SendRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("a reply is still streaming"),
            Self::EmptyInput => f.write_str("message is empty"),
        }
    }
}

impl std::error::Error for SendRejection {}

/// Classified failure of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExchangeFailure {
    pub fn from_error(error: &ClientError) -> Self {
        let message = match error {
            ClientError::HttpStatus { status, body, .. } => {
                let body = body.trim();
                if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {body}")
                }
            }
            other => other.to_string(),
        };

        Self {
            kind: error.kind(),
            message,
        }
    }

    /// Text shown to the user inside the assistant message.
    pub fn note(&self) -> String {
        match self.kind {
            FailureKind::Connection => CONNECTION_NOTE.to_string(),
            FailureKind::Timeout => TIMEOUT_NOTE.to_string(),
            FailureKind::Aborted => ABORTED_NOTE.to_string(),
            FailureKind::Server => format!("{SERVER_NOTE_PREFIX}{}", self.message),
            FailureKind::Local => format!("{LOCAL_NOTE_PREFIX}{}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The stream ended cleanly. `server_error` holds the last error chunk, if any.
    Completed { server_error: Option<String> },
    Failed(ExchangeFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Reconnected,
    /// The backend answered the probe with a status other than ok/healthy.
    Unhealthy(String),
    Unreachable(ExchangeFailure),
}

#[derive(Debug, Default)]
struct ExchangeSummary {
    content_chunks: usize,
    server_error: Option<String>,
}

/// Clears the streaming flag however the exchange future ends, including
/// when the caller drops it mid-stream.
struct StreamingGuard<'a> {
    store: &'a ConversationStore,
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        self.store.set_streaming(false);
    }
}

/// The chat actions a front-end invokes: send, retry and clear.
pub struct ChatSession {
    store: Arc<ConversationStore>,
    backend: Arc<dyn ChatBackend>,
    history: Arc<dyn HistoryStore>,
    connection: Arc<ConnectionMonitor>,
    h3_state: ArcSwap<H3State>,
    exchange_timeout: Duration,
}

impl ChatSession {
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn ChatBackend>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            store,
            backend,
            history,
            connection: Arc::new(ConnectionMonitor::new()),
            h3_state: ArcSwap::from_pointee(H3State::default()),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_connection(mut self, connection: Arc<ConnectionMonitor>) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_exchange_timeout(mut self, exchange_timeout: Duration) -> Self {
        self.exchange_timeout = exchange_timeout;
        self
    }

    pub fn with_h3_state(self, h3_state: H3State) -> Self {
        self.h3_state.store(Arc::new(h3_state));
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn connection(&self) -> &Arc<ConnectionMonitor> {
        &self.connection
    }

    pub fn h3_state(&self) -> H3State {
        **self.h3_state.load()
    }

    pub fn set_h3_state(&self, h3_state: H3State) {
        self.h3_state.store(Arc::new(h3_state));
    }

    /// Runs one exchange to completion.
    ///
    /// Appends the user message and an empty assistant placeholder, then
    /// applies every chunk to the store in arrival order. Failures never
    /// escape as errors: they end up in the store as an error and a note on
    /// the placeholder, and are reported through [`ExchangeOutcome::Failed`].
    pub async fn send(&self, input: &str) -> Result<ExchangeOutcome, SendRejection> {
        if input.trim().is_empty() {
            return Err(SendRejection::EmptyInput);
        }
        if !self.store.try_begin_exchange() {
            tracing::debug!("refusing send while a reply is streaming");
            return Err(SendRejection::Busy);
        }

        let guard = StreamingGuard { store: &self.store };
        self.store.add_message(Message::user(input));
        self.store.add_message(Message::placeholder());

        let request = ChatRequest::streaming(input, self.h3_state());
        let outcome = match self.run_exchange(request).await {
            Ok(summary) => self.finish_completed(summary),
            Err(error) => ExchangeOutcome::Failed(self.finish_failed(&error)),
        };

        drop(guard);
        self.persist_history();
        Ok(outcome)
    }

    /// Clears the error, probes the backend and appends a status note when it
    /// answers healthy. History is never removed.
    pub async fn retry(&self) -> Result<RetryOutcome, SendRejection> {
        if self.store.is_streaming() {
            return Err(SendRejection::Busy);
        }

        self.store.set_error(None);
        let outcome = match self.connection.probe(self.backend.as_ref()).await {
            Ok(status) if status.is_healthy() => {
                self.store.add_message(Message::assistant(RECONNECTED_NOTE));
                self.persist_history();
                RetryOutcome::Reconnected
            }
            Ok(status) => {
                self.store
                    .set_error(Some(format!("backend reported status `{}`", status.status)));
                RetryOutcome::Unhealthy(status.status)
            }
            Err(error) => {
                let failure = ExchangeFailure::from_error(&error);
                self.store.set_error(Some(failure.message.clone()));
                RetryOutcome::Unreachable(failure)
            }
        };

        tracing::info!(outcome = ?outcome, "retry finished");
        Ok(outcome)
    }

    pub fn clear_history(&self) {
        self.store.clear_messages();
        self.persist_history();
    }

    async fn run_exchange(&self, request: ChatRequest) -> ClientResult<ExchangeSummary> {
        let ChatStreamHandle { mut stream, worker } = self.backend.stream_chat(request)?;
        let mut worker = tokio::spawn(worker);
        let deadline = Instant::now() + self.exchange_timeout;

        let result = match tokio::time::timeout_at(deadline, self.consume(&mut stream)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.exchange_timeout.as_millis() as u64,
                    "chat exchange timed out, cancelling stream"
                );
                stream.cancel();
                Err(ClientError::Timeout {
                    stage: "await-chat-stream",
                    timeout_ms: self.exchange_timeout.as_millis() as u64,
                })
            }
        };

        drop(stream);
        match tokio::time::timeout(WORKER_SHUTDOWN_GRACE, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "chat stream worker did not finish cleanly");
            }
            Err(_) => {
                tracing::warn!("chat stream worker ignored cancellation, aborting it");
                worker.abort();
            }
        }

        result
    }

    async fn consume(&self, stream: &mut ChunkStream) -> ClientResult<ExchangeSummary> {
        let mut summary = ExchangeSummary::default();

        while let Some(item) = stream.recv().await {
            match item? {
                ChatChunk::Start {
                    message_id,
                    conversation_id,
                } => {
                    tracing::debug!(?message_id, ?conversation_id, "assistant reply started");
                }
                ChatChunk::Content(fragment) => {
                    summary.content_chunks += 1;
                    self.store.update_last_message(Some(&fragment), None);
                }
                ChatChunk::Meta(metadata) => {
                    self.store.update_last_message(None, Some(metadata));
                }
                ChatChunk::Error(description) => {
                    tracing::warn!(error = %description, "backend reported an error mid-stream");
                    self.store.set_error(Some(description.clone()));
                    summary.server_error = Some(description);
                }
                ChatChunk::Done => break,
            }
        }

        Ok(summary)
    }

    fn finish_completed(&self, summary: ExchangeSummary) -> ExchangeOutcome {
        tracing::debug!(
            content_chunks = summary.content_chunks,
            server_error = summary.server_error.is_some(),
            "chat exchange completed"
        );

        if self.placeholder_is_empty() {
            let note = summary.server_error.as_deref().unwrap_or(EMPTY_REPLY_NOTE);
            self.store.update_last_message(Some(note), None);
        }

        self.connection.record_exchange(None);
        ExchangeOutcome::Completed {
            server_error: summary.server_error,
        }
    }

    fn finish_failed(&self, error: &ClientError) -> ExchangeFailure {
        let failure = ExchangeFailure::from_error(error);
        tracing::warn!(
            error = %error,
            stage = error.stage(),
            kind = ?failure.kind,
            "chat exchange failed"
        );

        self.store.set_error(Some(failure.message.clone()));
        let note = failure.note();
        if self.placeholder_is_empty() {
            self.store.update_last_message(Some(&note), None);
        } else {
            self.store.update_last_message(Some(&format!("\n\n{note}")), None);
        }

        self.connection.record_exchange(Some(failure.kind));
        failure
    }

    fn placeholder_is_empty(&self) -> bool {
        self.store
            .last_message()
            .is_some_and(|message| message.content.is_empty())
    }

    fn persist_history(&self) {
        let stored = self
            .store
            .messages()
            .iter()
            .map(Message::to_stored)
            .collect::<Vec<_>>();

        if let Err(error) = self.history.save(&stored) {
            tracing::warn!(error = %error, "failed to persist conversation history");
        }
    }
}

/// Builds the store from persisted history, starting empty when it cannot be read.
pub fn restore_conversation(history: &dyn HistoryStore) -> ConversationStore {
    match history.load() {
        Ok(stored) => {
            ConversationStore::from_messages(stored.into_iter().map(Message::from_stored).collect())
        }
        Err(error) => {
            tracing::warn!(error = %error, "could not load conversation history, starting empty");
            ConversationStore::new()
        }
    }
}
