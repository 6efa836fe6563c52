#![deny(unsafe_code)]

/// Conversation state and the chat actions that drive it.
pub mod chat;
/// Backend reachability indicator.
pub mod connection;
/// Knowledge-base actions proxied to the backend.
pub mod memory;
/// Settings persistence.
pub mod settings;

#[cfg(test)]
mod testing;
