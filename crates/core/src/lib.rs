//! Core logic of the tool-augmented chat: the conversation orchestrator,
//! model client, prompt rendering, and conversation bookkeeping.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod config;
pub mod conversation;
mod error;
mod model_client;
mod orchestrator;
mod prompt;
mod tool_client;

pub use config::{OrchestratorConfig, RetryConfig, ToolErrorPolicy};
pub use error::Error;
pub use orchestrator::{
    ConnectionState, Orchestrator, OrchestratorBuilder, ProcessOutcome,
};
pub use prompt::{ContextSelector, SystemPrompt};
