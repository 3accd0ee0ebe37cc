//! Chat Client - application session on top of `channel_mux`
//!
//! [`ChatSession`] owns the multiplexer lifecycle for the whole application:
//! one connection, the per-user channel and one channel per open
//! conversation. Screens receive [`Conversation`] handles instead of touching
//! the socket, so navigation never opens a second connection or leaks
//! listeners.

pub mod config;
mod error;
pub mod events;
pub mod session;

pub use config::{ClientConfig, FileConfig, load_config};
pub use error::SessionError;
pub use events::{ChatMessage, ReadReceipt, TypingNotice, conversation_topic, user_topic};
pub use session::{ChatSession, Conversation};
