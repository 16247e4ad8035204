//! A terminal chat that answers questions with a model and the tools of an
//! MCP server.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to embed the chat session into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod session;
mod settings;

pub use session::{ChatSession, ChatSessionBuilder};
pub use settings::{Settings, SettingsError};

/// Re-exports of [`toolchat_core`] crate.
pub mod core {
    pub use toolchat_core::*;
}
