//! Conversational front-end support
//!
//! [`ChatLoop`] lets a client drive the pipeline through the fixed
//! [`ToolRegistry`], one bounded turn at a time, inside an in-memory
//! [`Session`].

pub mod session;
pub mod tools;
pub mod turn;

pub use session::{Session, SessionStore};
pub use tools::{ToolRegistry, TOOL_NAMES};
pub use turn::{preview, ChatLoop, ChatOutcome, EMPTY_REPLY_NOTICE};
