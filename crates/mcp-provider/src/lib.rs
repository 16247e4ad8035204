//! A tool provider speaking the Model Context Protocol over HTTP and
//! server-sent events.

#[macro_use]
extern crate tracing;

mod config;
mod proto;
mod transport;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use toolchat_tool_provider::{
    ErrorKind, ProviderCapabilities, ResourceContent, ResourceDescriptor,
    ToolDescriptor, ToolOutput, ToolProvider, ToolProviderError, ToolSession,
};
use tracing::Instrument;

pub use config::{McpConfig, McpConfigBuilder};
pub use proto::PROTOCOL_VERSION;

use crate::proto::{
    InitializeResult, ListResourcesResult, ListToolsResult,
    ReadResourceResult, RpcError, cursor_params,
};
use crate::transport::SseTransport;

/// Error type for [`McpProvider`] and [`McpSession`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    code: Option<i64>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            code: None,
        }
    }

    fn from_rpc(error: RpcError) -> Self {
        Self {
            message: error.message,
            kind: ErrorKind::Server,
            code: Some(error.code),
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the JSON-RPC error code, if the server reported one.
    #[inline]
    pub fn code(&self) -> Option<i64> {
        self.code
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for Error {}

impl ToolProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// MCP tool provider.
///
/// Each [`connect`](ToolProvider::connect) opens a fresh event stream and
/// runs the `initialize` handshake on it.
#[derive(Clone, Debug)]
pub struct McpProvider {
    client: Client,
    config: Arc<McpConfig>,
}

impl McpProvider {
    /// Creates a new `McpProvider` with the given configuration.
    #[inline]
    pub fn new(config: McpConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ToolProvider for McpProvider {
    type Error = Error;
    type Session = McpSession;

    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send {
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        async move { McpSession::establish(client, &config).await }
            .instrument(debug_span!("mcp_connect"))
    }
}

/// A negotiated MCP session.
pub struct McpSession {
    transport: SseTransport,
    capabilities: ProviderCapabilities,
    server_name: Option<String>,
}

impl fmt::Debug for McpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpSession")
            .field("capabilities", &self.capabilities)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl McpSession {
    async fn establish(client: Client, config: &McpConfig) -> Result<Self, Error> {
        let transport = SseTransport::open(client, config).await?;
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": config.client_name,
                "version": config.client_version,
            },
        });
        let result = transport.request("initialize", Some(params)).await?;
        let init: InitializeResult = decode(result)?;
        if init.protocol_version != PROTOCOL_VERSION {
            warn!(
                "server negotiated protocol {}, continuing anyway",
                init.protocol_version
            );
        }
        transport.notify("notifications/initialized", None).await?;

        let server_name = init.server_info.map(|info| info.name);
        info!(
            "connected to {}",
            server_name.as_deref().unwrap_or("<unnamed server>")
        );
        Ok(Self {
            transport,
            capabilities: ProviderCapabilities {
                tools: init.capabilities.tools.is_some(),
                resources: init.capabilities.resources.is_some(),
            },
            server_name,
        })
    }

    /// Returns the name the server introduced itself with.
    #[inline]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, Error> {
        decode(self.transport.request(method, params).await?)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|err| {
        Error::new(format!("unexpected result: {err}"), ErrorKind::Protocol)
    })
}

fn more_pages(cursor: Option<String>) -> Option<String> {
    cursor.filter(|cursor| !cursor.is_empty())
}

impl ToolSession for McpSession {
    type Error = Error;

    #[inline]
    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let mut tools = vec![];
        let mut cursor = None;
        loop {
            let page: ListToolsResult =
                self.call("tools/list", cursor_params(cursor)).await?;
            tools.extend(page.tools);
            cursor = more_pages(page.next_cursor);
            if cursor.is_none() {
                break;
            }
        }
        debug!("listed {} tools", tools.len());
        Ok(tools)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, Error> {
        let mut resources = vec![];
        let mut cursor = None;
        loop {
            let page: ListResourcesResult =
                self.call("resources/list", cursor_params(cursor)).await?;
            resources.extend(page.resources);
            cursor = more_pages(page.next_cursor);
            if cursor.is_none() {
                break;
            }
        }
        debug!("listed {} resources", resources.len());
        Ok(resources)
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, Error> {
        let result: ReadResourceResult = self
            .call("resources/read", Some(json!({ "uri": uri })))
            .await?;
        let mime_type = result
            .contents
            .iter()
            .find_map(|contents| contents.mime_type.clone());
        let texts: Vec<_> = result
            .contents
            .into_iter()
            .filter_map(|contents| contents.text)
            .collect();
        if texts.is_empty() {
            return Err(Error::new(
                format!("resource `{uri}` has no textual content"),
                ErrorKind::Protocol,
            ));
        }
        Ok(ResourceContent {
            uri: uri.to_owned(),
            mime_type,
            text: texts.join("\n"),
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, Error> {
        let params = json!({ "name": name, "arguments": arguments });
        self.call("tools/call", Some(params)).await
    }
}
