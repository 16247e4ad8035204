use serde_json::Value;

use crate::error::ToolProviderError;
use crate::types::{
    ProviderCapabilities, ResourceContent, ResourceDescriptor, ToolDescriptor,
    ToolOutput,
};

/// A type that knows how to reach a tool provider.
///
/// Calling [`ToolProvider::connect`] opens a new transport and negotiates
/// capabilities. A failed connect must not leave anything behind, so
/// callers are free to try again later.
pub trait ToolProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ToolProviderError;

    /// The established session type.
    type Session: ToolSession<Error = Self::Error>;

    /// Opens a connection to the provider.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send;
}

/// A live connection to a tool provider.
///
/// Sessions are shared by concurrent conversations, so all operations
/// take `&self`.
pub trait ToolSession: Send + Sync + 'static {
    /// The error type that may be returned by the session.
    type Error: ToolProviderError;

    /// Returns what the provider announced during negotiation.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Fetches the tool catalog.
    fn list_tools(
        &self,
    ) -> impl Future<Output = Result<Vec<ToolDescriptor>, Self::Error>> + Send;

    /// Fetches the resource catalog.
    ///
    /// Only meaningful when [`ProviderCapabilities::resources`] is set.
    fn list_resources(
        &self,
    ) -> impl Future<Output = Result<Vec<ResourceDescriptor>, Self::Error>> + Send;

    /// Reads the resource addressed by `uri`.
    fn read_resource(
        &self,
        uri: &str,
    ) -> impl Future<Output = Result<ResourceContent, Self::Error>> + Send;

    /// Invokes the tool named `name` with `arguments`.
    ///
    /// A tool that ran and failed is reported through
    /// [`ToolOutput::is_error`], not through `Err`.
    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<ToolOutput, Self::Error>> + Send;
}
