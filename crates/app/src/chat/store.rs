use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use twin_client::Metadata;

use super::message::Message;

/// Snapshot of everything the chat view renders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub is_streaming: bool,
    pub error: Option<String>,
}

/// Single authoritative holder of message history and streaming/error flags.
///
/// Every mutation bumps a revision observable through [`subscribe`](Self::subscribe),
/// which is how views learn they need to re-render.
pub struct ConversationStore {
    state: Mutex<ConversationState>,
    revision: watch::Sender<u64>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::from_messages(Vec::new())
    }

    /// Rehydrates a store from persisted history. Streaming never survives a restart.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(ConversationState {
                messages,
                is_streaming: false,
                error: None,
            }),
            revision,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.lock().messages.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().is_streaming
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn add_message(&self, message: Message) {
        self.mutate(|state| state.messages.push(message));
    }

    /// Appends `content_delta` to the newest message and merges `metadata_patch`
    /// into its metadata.
    ///
    /// Returns `false` without touching anything when there is no message yet.
    pub fn update_last_message(
        &self,
        content_delta: Option<&str>,
        metadata_patch: Option<Metadata>,
    ) -> bool {
        let mut state = self.lock();
        let Some(last) = state.messages.last_mut() else {
            tracing::debug!("update_last_message called on an empty conversation");
            return false;
        };

        if let Some(delta) = content_delta {
            last.content.push_str(delta);
        }

        if let Some(patch) = metadata_patch {
            last.metadata.get_or_insert_with(Metadata::new).merge(patch);
        }

        drop(state);
        self.notify();
        true
    }

    pub fn set_streaming(&self, is_streaming: bool) {
        self.mutate(|state| state.is_streaming = is_streaming);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.mutate(|state| state.error = error);
    }

    /// Empties the history. Streaming and error flags are left as they are.
    pub fn clear_messages(&self) {
        self.mutate(|state| state.messages.clear());
    }

    /// Marks a new exchange as started unless one is already running.
    ///
    /// The check and the flag flip happen under one lock, so two callers can
    /// never both win. Starting an exchange clears the previous error.
    pub fn try_begin_exchange(&self) -> bool {
        let mut state = self.lock();
        if state.is_streaming {
            return false;
        }

        state.is_streaming = true;
        state.error = None;
        drop(state);
        self.notify();
        true
    }

    fn mutate(&self, apply: impl FnOnce(&mut ConversationState)) {
        apply(&mut self.lock());
        self.notify();
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Role;
    use twin_client::{MetadataValue, STRATEGIES_KEY};

    #[test]
    fn messages_keep_call_order() {
        let store = ConversationStore::new();
        for index in 0..20 {
            let role = if index % 2 == 0 { Role::User } else { Role::Assistant };
            store.add_message(Message::new(role, format!("message-{index}")));
        }

        let contents = store
            .messages()
            .into_iter()
            .map(|message| message.content)
            .collect::<Vec<_>>();
        let expected = (0..20).map(|index| format!("message-{index}")).collect::<Vec<_>>();
        assert_eq!(contents, expected);
    }

    #[test]
    fn deltas_concatenate_onto_the_last_message_only() {
        let store = ConversationStore::new();
        store.add_message(Message::user("question"));
        store.add_message(Message::placeholder());

        for delta in ["The ", "quick ", "brown ", "fox"] {
            assert!(store.update_last_message(Some(delta), None));
        }

        let messages = store.messages();
        assert_eq!(messages[0].content, "question");
        assert_eq!(messages[1].content, "The quick brown fox");
    }

    #[test]
    fn update_on_empty_store_is_a_no_op() {
        let store = ConversationStore::new();
        let revisions = store.subscribe();

        assert!(!store.update_last_message(Some("ghost"), Some(Metadata::new().with("k", "v"))));
        assert!(store.is_empty());
        assert!(!revisions.has_changed().unwrap());
    }

    #[test]
    fn metadata_patch_creates_then_merges() {
        let store = ConversationStore::new();
        store.add_message(Message::placeholder());

        store.update_last_message(None, Some(Metadata::new().with("mode", "coach")));
        store.update_last_message(
            None,
            Some(Metadata::new().with(STRATEGIES_KEY, vec!["mentor".to_string()])),
        );

        let metadata = store.last_message().unwrap().metadata.unwrap();
        assert_eq!(metadata.get("mode"), Some(&MetadataValue::Text("coach".to_string())));
        assert_eq!(metadata.strategies(), Some(&["mentor".to_string()][..]));
    }

    #[test]
    fn clear_leaves_flags_untouched() {
        let store = ConversationStore::new();
        store.add_message(Message::user("hi"));
        store.set_streaming(true);
        store.set_error(Some("backend offline".to_string()));

        store.clear_messages();

        let state = store.snapshot();
        assert!(state.messages.is_empty());
        assert!(state.is_streaming);
        assert_eq!(state.error.as_deref(), Some("backend offline"));
    }

    #[test]
    fn begin_exchange_is_refused_while_streaming() {
        let store = ConversationStore::new();
        store.set_error(Some("old failure".to_string()));

        assert!(store.try_begin_exchange());
        assert!(store.is_streaming());
        assert_eq!(store.error(), None);

        store.set_error(Some("mid-stream".to_string()));
        assert!(!store.try_begin_exchange());
        assert_eq!(store.error().as_deref(), Some("mid-stream"));
    }

    #[test]
    fn every_mutation_bumps_the_revision() {
        let store = ConversationStore::new();
        let mut revisions = store.subscribe();

        store.add_message(Message::user("hi"));
        assert!(revisions.has_changed().unwrap());
        assert_eq!(*revisions.borrow_and_update(), 1);

        store.set_streaming(true);
        store.update_last_message(Some("!"), None);
        assert_eq!(*revisions.borrow_and_update(), 3);
    }
}
