use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use crate::chunk::ChatChunk;
use crate::error::ClientResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
/// Future driving one chat request; callers spawn it next to the reader.
pub type ChatStreamWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Receiving end of one exchange.
///
/// Yields decoded chunks in arrival order, then `None` once the connection
/// closed. A transport failure arrives as one `Err` item followed by `None`.
pub struct ChunkStream {
    chunks: mpsc::UnboundedReceiver<ClientResult<ChatChunk>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct ChatStreamHandle {
    pub stream: ChunkStream,
    pub worker: ChatStreamWorker,
}

impl ChunkStream {
    pub(crate) fn new(
        chunks: mpsc::UnboundedReceiver<ClientResult<ChatChunk>>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            chunks,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<ClientResult<ChatChunk>> {
        self.chunks.recv().await
    }

    /// Asks the worker to stop and release its connection.
    ///
    /// Returns `false` when the worker is already gone or was cancelled before.
    pub fn cancel(&mut self) -> bool {
        self.chunks.close();
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Producer side handed to a worker.
pub struct ChunkSink {
    chunks: mpsc::UnboundedSender<ClientResult<ChatChunk>>,
}

impl ChunkSink {
    /// Forwards one item; `false` means the reader is gone and the worker should stop.
    pub fn send(&self, item: ClientResult<ChatChunk>) -> bool {
        self.chunks.send(item).is_ok()
    }
}

/// Creates a connected sink/stream pair plus the worker's cancel signal.
///
/// Public so alternative backends can feed the same reader contract.
pub fn chunk_channel() -> (ChunkSink, ChunkStream, oneshot::Receiver<()>) {
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        ChunkSink { chunks: chunk_tx },
        ChunkStream::new(chunk_rx, cancel_tx),
        cancel_rx,
    )
}

/// Builds a handle whose worker replays `items` and then closes the stream.
pub fn scripted_stream(items: Vec<ClientResult<ChatChunk>>) -> ChatStreamHandle {
    let (sink, stream, _cancel_rx) = chunk_channel();
    let worker: ChatStreamWorker = Box::pin(async move {
        for item in items {
            if !sink.send(item) {
                break;
            }
        }
    });

    ChatStreamHandle { stream, worker }
}
