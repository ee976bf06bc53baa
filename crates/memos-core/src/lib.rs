//! MemOS Core - shared types and abstractions
//!
//! Provides the error type, chat message model, and logging setup used by
//! every other crate in the workspace.

pub mod error;
pub mod logging;
pub mod message;

pub use error::*;
pub use logging::*;
pub use message::*;
