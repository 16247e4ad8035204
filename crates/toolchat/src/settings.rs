use std::env;

use toolchat_anthropic_model::{AnthropicConfig, AnthropicConfigBuilder};
use toolchat_mcp_provider::{McpConfig, McpConfigBuilder};

/// Errors in the environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A required variable is absent.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable could not be parsed.
    #[error("{name} must be a non-negative integer, got `{value}`")]
    Invalid {
        /// Name of the variable.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
    /// The tool provider configuration is unusable.
    #[error(transparent)]
    Mcp(#[from] toolchat_mcp_provider::Error),
}

/// Settings read from environment variables.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    mcp_url: Option<String>,
    mcp_bearer_token: Option<String>,
    max_tool_rounds: Option<usize>,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to
    /// its value. Empty values count as absent.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let api_key = var("ANTHROPIC_API_KEY")
            .ok_or(SettingsError::Missing("ANTHROPIC_API_KEY"))?;
        let max_tool_rounds = match var("TOOLCHAT_MAX_TOOL_ROUNDS") {
            Some(value) => Some(value.trim().parse().map_err(|_| {
                SettingsError::Invalid {
                    name: "TOOLCHAT_MAX_TOOL_ROUNDS",
                    value,
                }
            })?),
            None => None,
        };
        Ok(Self {
            api_key,
            model: var("ANTHROPIC_MODEL"),
            base_url: var("ANTHROPIC_BASE_URL"),
            mcp_url: var("MCP_SERVER_URL"),
            mcp_bearer_token: var("MCP_BEARER_TOKEN"),
            max_tool_rounds,
        })
    }

    /// Returns the configuration of the model provider.
    pub fn anthropic_config(&self) -> AnthropicConfig {
        let mut builder = AnthropicConfigBuilder::with_api_key(&self.api_key);
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        builder.build()
    }

    /// Returns the configuration of the tool provider.
    pub fn mcp_config(&self) -> Result<McpConfig, SettingsError> {
        let mut builder = McpConfigBuilder::new()
            .with_client_info("toolchat", env!("CARGO_PKG_VERSION"));
        if let Some(url) = &self.mcp_url {
            builder = builder.with_base_url(url);
        }
        if let Some(token) = &self.mcp_bearer_token {
            builder = builder.with_bearer_token(token);
        }
        Ok(builder.build()?)
    }

    /// Returns the tool round limit, if overridden.
    #[inline]
    pub fn max_tool_rounds(&self) -> Option<usize> {
        self.max_tool_rounds
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<deducted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("mcp_url", &self.mcp_url)
            .field(
                "mcp_bearer_token",
                &self.mcp_bearer_token.as_ref().map(|_| "<deducted>"),
            )
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_required_api_key() {
        let err = Settings::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Missing("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn test_full_settings() {
        let settings = Settings::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("ANTHROPIC_MODEL", "claude-test"),
            ("MCP_SERVER_URL", "http://127.0.0.1:9000/sse"),
            ("MCP_BEARER_TOKEN", "token"),
            ("TOOLCHAT_MAX_TOOL_ROUNDS", "2"),
        ]))
        .unwrap();
        assert_eq!(settings.max_tool_rounds(), Some(2));
        assert_eq!(settings.anthropic_config().model(), "claude-test");
        let mcp = settings.mcp_config().unwrap();
        assert_eq!(mcp.base_url().as_str(), "http://127.0.0.1:9000/sse");

        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("\"token\""));
    }

    #[test]
    fn test_invalid_rounds() {
        let err = Settings::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("TOOLCHAT_MAX_TOOL_ROUNDS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("many"));
    }
}
