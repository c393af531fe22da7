//! Message stream controller.
//!
//! - [`stream`]: the synchronous per-conversation message sequence
//! - [`typing`]: the debounced peer typing flag
//! - [`session`]: one open conversation wired to transport and REST
//! - [`directory`]: the conversation list of an identity

pub mod directory;
pub mod session;
pub mod stream;
pub mod typing;

pub use directory::{load_conversations, sort_by_activity};
pub use session::{ChatSession, ChatTarget, SendReceipt};
pub use stream::{MessageStream, ReceiveOutcome, StreamPhase};
pub use typing::TypingIndicator;
