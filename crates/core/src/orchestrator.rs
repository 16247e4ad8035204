mod builder;

use std::sync::Arc;

use serde_json::json;
use tokio::sync::OnceCell;
use toolchat_model::{
    ModelMessage, ModelRequest, ModelTool, ToolCallRequest, ToolCallResult,
};
use toolchat_tool_provider::{
    ProviderCapabilities, ResourceDescriptor, ToolDescriptor, ToolOutput,
};
use tracing::Instrument;

pub use builder::OrchestratorBuilder;

use crate::config::{OrchestratorConfig, ToolErrorPolicy};
use crate::error::Error;
use crate::model_client::{ModelClient, ModelClientResponse, ResponseBlock};
use crate::prompt::ContextSelector;
use crate::tool_client::{ProviderObject, SessionObject, model_tool};

/// Invocation id of the synthetic resource read placed before the history.
const GROUNDING_CALL_ID: &str = "context_resource";
const GROUNDING_TOOL_NAME: &str = "read_resource";

/// Whether the orchestrator holds a live tool-provider session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session yet, or every attempt so far has failed.
    Disconnected,
    /// A session is established and the catalogs are cached.
    Connected,
}

struct Connection {
    session: Box<dyn SessionObject>,
    capabilities: ProviderCapabilities,
    tools: Vec<ToolDescriptor>,
    model_tools: Vec<ModelTool>,
    resources: Vec<ResourceDescriptor>,
}

struct Inner {
    model_client: ModelClient,
    tool_provider: Box<dyn ProviderObject>,
    connection: OnceCell<Connection>,
    config: OrchestratorConfig,
}

/// Drives a tool-augmented conversation between a model and a tool
/// provider.
///
/// The orchestrator is a cheap handle: clones share one tool-provider
/// session and its cached catalogs. The session is established lazily by
/// the first caller that needs it. Concurrent callers wait for that single
/// attempt, and a failed attempt leaves the orchestrator disconnected so
/// that the next call tries again.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// The result of [`Orchestrator::process_message`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessOutcome {
    /// Text blocks and tool markers, joined with new lines.
    pub text: String,
    /// Raw outputs of the executed tools, in call order.
    pub tool_invocations: Vec<ToolOutput>,
    /// The conversation as last sent to the model, grounding included.
    pub transcript: Vec<ModelMessage>,
    /// Set when the model asked for tools after the round limit.
    pub tool_rounds_exhausted: bool,
    grounding_len: usize,
}

impl ProcessOutcome {
    /// Returns the transcript without the grounding turns, suitable as
    /// history for the next message.
    #[inline]
    pub fn history(&self) -> &[ModelMessage] {
        &self.transcript[self.grounding_len..]
    }
}

impl Orchestrator {
    fn from_builder(builder: OrchestratorBuilder) -> Self {
        let OrchestratorBuilder {
            model_client,
            tool_provider,
            config,
        } = builder;
        Self {
            inner: Arc::new(Inner {
                model_client,
                tool_provider,
                connection: OnceCell::new(),
                config,
            }),
        }
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Establishes the tool-provider session if there is none yet.
    pub async fn connect(&self) -> Result<(), Error> {
        self.connection().await.map(|_| ())
    }

    /// Returns the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        if self.inner.connection.initialized() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Returns the cached tool catalog, empty while disconnected.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.inner
            .connection
            .get()
            .map(|conn| conn.tools.clone())
            .unwrap_or_default()
    }

    /// Returns the cached resource catalog, empty while disconnected.
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.inner
            .connection
            .get()
            .map(|conn| conn.resources.clone())
            .unwrap_or_default()
    }

    async fn connection(&self) -> Result<&Connection, Error> {
        self.inner
            .connection
            .get_or_try_init(|| {
                establish(self.inner.tool_provider.as_ref())
                    .instrument(debug_span!("tool provider connect"))
            })
            .await
    }

    /// Answers `prompt`, running the tools the model asks for.
    ///
    /// `history` is sent to the model before the prompt. When `context` is
    /// set and the provider serves resources, the resource named after the
    /// context is read and placed before the history as a synthetic tool
    /// call; a failed read is reported to the model the same way instead
    /// of failing the request.
    ///
    /// # Errors
    ///
    /// Connection failures, model failures, and (under
    /// [`ToolErrorPolicy::Abort`]) tool failures abort the request, and no
    /// partial output is returned.
    pub async fn process_message(
        &self,
        prompt: &str,
        context: Option<&ContextSelector>,
        history: &[ModelMessage],
    ) -> Result<ProcessOutcome, Error> {
        let connection = self.connection().await?;
        let config = &self.inner.config;
        let system_prompt = config.system_prompt.render(context);

        let mut transcript = Vec::with_capacity(history.len() + 3);
        let grounded =
            context.filter(|_| connection.capabilities.resources);
        if let Some(context) = grounded {
            transcript.extend(self.ground(connection, context).await);
        }
        let grounding_len = transcript.len();
        transcript.extend_from_slice(history);
        transcript.push(ModelMessage::User(prompt.to_owned()));

        let mut text_parts = vec![];
        let mut tool_invocations = vec![];
        let mut tool_rounds_exhausted = false;

        let first = self
            .call_model(
                &system_prompt,
                &transcript,
                self.tools_for_depth(connection, 0),
                config.max_tokens,
            )
            .await?;
        // Each follow-up is consumed completely before the rest of the
        // response that triggered it, so text comes out in causal order.
        let mut pending = vec![(first.blocks.into_iter(), 0)];
        loop {
            let Some((blocks, depth)) = pending.last_mut() else {
                break;
            };
            let depth = *depth;
            let Some(block) = blocks.next() else {
                pending.pop();
                continue;
            };

            let call = match block {
                ResponseBlock::Text(text) => {
                    text_parts.push(text);
                    continue;
                }
                ResponseBlock::ToolCall(call) => call,
            };
            if depth >= config.max_tool_rounds {
                warn!(
                    "dropping call to `{}`, {} tool rounds exhausted",
                    call.name, config.max_tool_rounds
                );
                tool_rounds_exhausted = true;
                continue;
            }

            let output = self.invoke_tool(connection, &call).await?;
            text_parts.push(format!(
                "[Tool {} called with args: {}]",
                call.name, call.arguments
            ));
            let result = ToolCallResult {
                id: call.id.clone(),
                content: output.to_text(),
                is_error: output.is_error,
            };
            transcript.push(ModelMessage::ToolUse(call));
            transcript.push(ModelMessage::ToolResult(result));
            tool_invocations.push(output);

            let follow_up = self
                .call_model(
                    &system_prompt,
                    &transcript,
                    self.tools_for_depth(connection, depth + 1),
                    config.follow_up_max_tokens,
                )
                .await?;
            pending.push((follow_up.blocks.into_iter(), depth + 1));
        }

        Ok(ProcessOutcome {
            text: text_parts.join("\n"),
            tool_invocations,
            transcript,
            tool_rounds_exhausted,
            grounding_len,
        })
    }

    fn tools_for_depth(
        &self,
        connection: &Connection,
        depth: usize,
    ) -> Vec<ModelTool> {
        if depth < self.inner.config.max_tool_rounds {
            connection.model_tools.clone()
        } else {
            vec![]
        }
    }

    async fn ground(
        &self,
        connection: &Connection,
        context: &ContextSelector,
    ) -> [ModelMessage; 2] {
        let uri = format!(
            "{}{}",
            self.inner.config.resource_uri_prefix,
            context.name.to_lowercase()
        );
        let (content, is_error) = match connection.session.read_resource(&uri).await
        {
            Ok(resource) => (resource.text, false),
            Err(cause) => {
                let err = Error::ResourceRead {
                    uri: uri.clone(),
                    cause,
                };
                warn!("{err}");
                (format!("Error: {err}"), true)
            }
        };
        [
            ModelMessage::ToolUse(ToolCallRequest {
                id: GROUNDING_CALL_ID.to_owned(),
                name: GROUNDING_TOOL_NAME.to_owned(),
                arguments: json!({ "uri": uri }),
            }),
            ModelMessage::ToolResult(ToolCallResult {
                id: GROUNDING_CALL_ID.to_owned(),
                content,
                is_error,
            }),
        ]
    }

    async fn invoke_tool(
        &self,
        connection: &Connection,
        call: &ToolCallRequest,
    ) -> Result<ToolOutput, Error> {
        trace!("calling `{}` with {}", call.name, call.arguments);
        let result = connection
            .session
            .call_tool(&call.name, call.arguments.clone())
            .instrument(debug_span!("tool call", name = %call.name))
            .await;
        match result {
            Ok(output) => Ok(output),
            Err(cause) => match self.inner.config.tool_error_policy {
                ToolErrorPolicy::Abort => Err(Error::ToolInvocation {
                    name: call.name.clone(),
                    cause,
                }),
                ToolErrorPolicy::ReportToModel => {
                    warn!("tool `{}` failed: {cause}", call.name);
                    Ok(ToolOutput::error(format!("Error: {cause}")))
                }
            },
        }
    }

    async fn call_model(
        &self,
        system_prompt: &str,
        transcript: &[ModelMessage],
        tools: Vec<ModelTool>,
        max_tokens: u32,
    ) -> Result<ModelClientResponse, Error> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ModelMessage::System(system_prompt.to_owned()));
        messages.extend_from_slice(transcript);
        let req = ModelRequest {
            messages,
            tools,
            max_tokens: Some(max_tokens),
        };
        let model_client = &self.inner.model_client;
        let result = match &self.inner.config.retry {
            Some(retry) => model_client.send_request_with_retry(req, retry).await,
            None => model_client.send_request(req).await,
        };
        result.map_err(|cause| Error::ModelCall { cause })
    }
}

async fn establish(provider: &dyn ProviderObject) -> Result<Connection, Error> {
    let session = provider
        .connect()
        .await
        .map_err(|cause| Error::Connection { cause })?;
    let capabilities = session.capabilities();
    let tools = if capabilities.tools {
        session
            .list_tools()
            .await
            .map_err(|cause| Error::Connection { cause })?
    } else {
        vec![]
    };
    let resources = if capabilities.resources {
        session
            .list_resources()
            .await
            .map_err(|cause| Error::Connection { cause })?
    } else {
        vec![]
    };
    info!(
        "connected to tool provider with {} tools and {} resources",
        tools.len(),
        resources.len()
    );
    debug!(
        "tools: {:?}",
        tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>()
    );
    let model_tools = tools.iter().map(model_tool).collect();
    Ok(Connection {
        session,
        capabilities,
        tools,
        model_tools,
        resources,
    })
}
