use toolchat_model::ModelProvider;
use toolchat_tool_provider::ToolProvider;

use super::Orchestrator;
use crate::config::{OrchestratorConfig, RetryConfig, ToolErrorPolicy};
use crate::model_client::ModelClient;
use crate::prompt::SystemPrompt;
use crate::tool_client::{AnyProvider, ProviderObject};

/// [`Orchestrator`] builder.
pub struct OrchestratorBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) tool_provider: Box<dyn ProviderObject>,
    pub(crate) config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the specified providers.
    #[inline]
    pub fn with_providers<M, T>(model_provider: M, tool_provider: T) -> Self
    where
        M: ModelProvider + 'static,
        T: ToolProvider + 'static,
    {
        Self {
            model_client: ModelClient::new(model_provider),
            tool_provider: Box::new(AnyProvider(tool_provider)),
            config: OrchestratorConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    #[inline]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the output token limits of the first and follow-up calls.
    #[inline]
    pub fn max_tokens(mut self, first: u32, follow_up: u32) -> Self {
        self.config.max_tokens = first;
        self.config.follow_up_max_tokens = follow_up;
        self
    }

    /// Sets how many nested rounds of tool calls run per message.
    #[inline]
    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.config.max_tool_rounds = rounds;
        self
    }

    /// Sets how failed tool invocations are handled.
    #[inline]
    pub fn tool_error_policy(mut self, policy: ToolErrorPolicy) -> Self {
        self.config.tool_error_policy = policy;
        self
    }

    /// Sets the system prompt template.
    #[inline]
    pub fn system_prompt(mut self, prompt: SystemPrompt) -> Self {
        self.config.system_prompt = prompt;
        self
    }

    /// Sets the retry policy of model calls, `None` disables retries.
    #[inline]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    /// Builds the orchestrator. Nothing is connected until first use.
    #[inline]
    pub fn build(self) -> Orchestrator {
        Orchestrator::from_builder(self)
    }
}
