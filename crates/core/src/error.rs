use toolchat_model::ModelProviderError;
use toolchat_tool_provider::ToolProviderError;

/// Errors surfaced by the orchestrator.
///
/// Provider errors are kept as trait objects so callers can still inspect
/// their kind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Opening the tool provider or fetching its catalogs failed.
    #[error("cannot connect to the tool provider: {cause}")]
    Connection {
        /// The underlying provider error.
        cause: Box<dyn ToolProviderError>,
    },

    /// The model API failed.
    #[error("model call failed: {cause}")]
    ModelCall {
        /// The underlying provider error.
        cause: Box<dyn ModelProviderError>,
    },

    /// A tool invocation failed at the protocol level.
    #[error("tool `{name}` failed: {cause}")]
    ToolInvocation {
        /// Name of the tool.
        name: String,
        /// The underlying provider error.
        cause: Box<dyn ToolProviderError>,
    },

    /// Grounding content could not be read.
    ///
    /// Never returned by `process_message`; it is rendered into the
    /// grounding turn instead.
    #[error("cannot read resource `{uri}`: {cause}")]
    ResourceRead {
        /// Address of the resource.
        uri: String,
        /// The underlying provider error.
        cause: Box<dyn ToolProviderError>,
    },
}
