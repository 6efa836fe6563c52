pub mod message;
pub mod session;
pub mod store;

pub use message::{Message, Role};
pub use session::{
    ABORTED_NOTE, CONNECTION_NOTE, ChatSession, DEFAULT_EXCHANGE_TIMEOUT, EMPTY_REPLY_NOTE,
    ExchangeFailure, ExchangeOutcome, RECONNECTED_NOTE, RetryOutcome, SendRejection, TIMEOUT_NOTE,
    restore_conversation,
};
pub use store::{ConversationState, ConversationStore};
