use std::fmt::Debug;
use std::time::Duration;

use reqwest::Url;
use toolchat_tool_provider::ErrorKind;

use crate::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:8000/connection";

/// Builder for [`McpConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct McpConfigBuilder {
    base_url: Option<String>,
    bearer_token: Option<String>,
    client_name: Option<String>,
    client_version: Option<String>,
    timeout: Option<Duration>,
}

impl McpConfigBuilder {
    /// Creates a builder with everything left to defaults.
    #[inline]
    pub fn new() -> Self {
        Self {
            base_url: None,
            bearer_token: None,
            client_name: None,
            client_version: None,
            timeout: None,
        }
    }

    /// Sets the URL of the event stream the session starts from.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets a bearer token sent in the `Authorization` header.
    #[inline]
    pub fn with_bearer_token<S: Into<String>>(mut self, token: S) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the client identity announced during the handshake.
    #[inline]
    pub fn with_client_info<S1: Into<String>, S2: Into<String>>(
        mut self,
        name: S1,
        version: S2,
    ) -> Self {
        self.client_name = Some(name.into());
        self.client_version = Some(version.into());
        self
    }

    /// Bounds how long a single request may wait for its response.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<McpConfig, Error> {
        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(base_url).map_err(|err| {
            Error::new(
                format!("invalid base URL `{base_url}`: {err}"),
                ErrorKind::Transport,
            )
        })?;
        Ok(McpConfig {
            base_url,
            bearer_token: self.bearer_token,
            client_name: self
                .client_name
                .unwrap_or_else(|| "toolchat".to_owned()),
            client_version: self
                .client_version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned()),
            timeout: self.timeout,
        })
    }
}

impl Default for McpConfigBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for McpConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConfigBuilder")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<deducted>"))
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuration for the MCP tool provider.
#[derive(Clone, PartialEq, Eq)]
pub struct McpConfig {
    pub(crate) base_url: Url,
    pub(crate) bearer_token: Option<String>,
    pub(crate) client_name: String,
    pub(crate) client_version: String,
    pub(crate) timeout: Option<Duration>,
}

impl McpConfig {
    /// Returns the URL of the event stream.
    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Debug for McpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConfig")
            .field("base_url", &self.base_url.as_str())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<deducted>"))
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = McpConfigBuilder::new().build().unwrap();
        assert_eq!(config.base_url().as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.client_name, "toolchat");
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_redaction_and_invalid_url() {
        let config = McpConfigBuilder::new()
            .with_bearer_token("top-secret")
            .build()
            .unwrap();
        assert!(!format!("{config:?}").contains("top-secret"));

        let err = McpConfigBuilder::new()
            .with_base_url("not a url")
            .build()
            .unwrap_err();
        assert!(err.message().contains("not a url"));
    }
}
