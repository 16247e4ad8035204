//! Scripted fakes of the model and tool providers for testing purpose.

mod model;
mod preset;
mod tool;

pub use model::{Error, TestModelProvider, TestModelResponse};
pub use preset::*;
pub use tool::{TestToolProvider, TestToolSession, ToolError};
