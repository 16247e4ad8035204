use std::time::Duration;

use crate::prompt::SystemPrompt;

/// What to do when a tool invocation fails at the protocol level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ToolErrorPolicy {
    /// Abort the whole request with [`Error::ToolInvocation`].
    ///
    /// [`Error::ToolInvocation`]: crate::Error::ToolInvocation
    #[default]
    Abort,
    /// Hand the failure to the model as an error tool result and carry on.
    ReportToModel,
}

/// Exponential backoff for rate-limited model calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound of a single delay.
    pub max_interval: Duration,
    /// Give up once this much time has passed.
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Duration::from_secs(60),
        }
    }
}

/// Tunables of an [`Orchestrator`](crate::Orchestrator).
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Output token limit of the first model call.
    pub max_tokens: u32,
    /// Output token limit of the calls that follow a tool result.
    pub follow_up_max_tokens: u32,
    /// How many nested rounds of tool calls are executed per message.
    ///
    /// A tool call found in a response at depth `d` (the first response is
    /// at depth 0) runs only if `d < max_tool_rounds`, and a follow-up is
    /// offered the tool catalog only if it could still run tools.
    pub max_tool_rounds: usize,
    /// How failed tool invocations are handled.
    pub tool_error_policy: ToolErrorPolicy,
    /// Template of the system prompt.
    pub system_prompt: SystemPrompt,
    /// Prefix of the resource URI derived from a context name.
    pub resource_uri_prefix: String,
    /// Retry policy for rate-limited model calls, `None` disables retries.
    pub retry: Option<RetryConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            follow_up_max_tokens: 1000,
            max_tool_rounds: 5,
            tool_error_policy: ToolErrorPolicy::default(),
            system_prompt: SystemPrompt::default(),
            resource_uri_prefix: "resource://".to_owned(),
            retry: Some(RetryConfig::default()),
        }
    }
}
