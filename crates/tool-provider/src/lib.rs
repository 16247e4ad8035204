//! An abstraction layer for remote tool providers.
//!
//! A tool provider exposes a catalog of callable named operations ("tools")
//! and, optionally, addressable read-only documents ("resources") over a
//! persistent connection. This crate defines the shape of that protocol so
//! the orchestrator does not depend on any particular transport.
//!
//! Like the model abstraction, types in this crate don't define behavior.

#![deny(missing_docs)]

mod error;
mod provider;
mod types;

pub use error::*;
pub use provider::*;
pub use types::*;
