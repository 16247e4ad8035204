//! A model provider for the Anthropic Messages API.

#[macro_use]
extern crate tracing;

mod config;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use reqwest::{Client, StatusCode, header};
use toolchat_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use toolchat_sse::{Chunks, Sse};

pub use config::{AnthropicConfig, AnthropicConfigBuilder};
pub use response::AnthropicResponse;

/// Error type for [`AnthropicProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

fn error_kind_for_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        // 529 is the "overloaded" status of this API.
        429 | 529 => ErrorKind::RateLimitExceeded,
        400 | 404 | 413 => ErrorKind::InvalidRequest,
        _ => ErrorKind::Other,
    }
}

fn error_kind_for_type(error_type: &str) -> ErrorKind {
    match error_type {
        "rate_limit_error" | "overloaded_error" => ErrorKind::RateLimitExceeded,
        "invalid_request_error" | "not_found_error" => ErrorKind::InvalidRequest,
        _ => ErrorKind::Other,
    }
}

/// Anthropic model provider.
#[derive(Clone, Debug)]
pub struct AnthropicProvider {
    client: Client,
    config: Arc<AnthropicConfig>,
}

impl AnthropicProvider {
    /// Creates a new `AnthropicProvider` with the given configuration.
    #[inline]
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for AnthropicProvider {
    type Error = Error;
    type Response = AnthropicResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let anthropic_req = proto::create_request(req, &self.config);
        let resp_fut = self
            .client
            .post(format!("{}{}", self.config.base_url, "/messages"))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", proto::API_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(&anthropic_req)
            .send();

        async move {
            let resp = match resp_fut.await {
                Ok(resp) => resp,
                Err(err) => {
                    return Err(Error::new(format!("{err}"), ErrorKind::Other));
                }
            };

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let message = serde_json::from_str::<proto::ErrorBody>(&body)
                    .map(|body| body.error.message)
                    .unwrap_or(body);
                warn!("request rejected with {status}: {message}");
                return Err(Error::new(
                    format!("{status}: {message}"),
                    error_kind_for_status(status),
                ));
            }

            if !toolchat_sse::is_event_stream(&resp) {
                let content_type = resp.headers().get(header::CONTENT_TYPE);
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(AnthropicResponse::from_sse(sse))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            error_kind_for_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::RateLimitExceeded
        );
        assert_eq!(
            error_kind_for_status(StatusCode::from_u16(529).unwrap()),
            ErrorKind::RateLimitExceeded
        );
        assert_eq!(
            error_kind_for_status(StatusCode::BAD_REQUEST),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            error_kind_for_status(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorKind::Other
        );
        assert_eq!(
            error_kind_for_type("overloaded_error"),
            ErrorKind::RateLimitExceeded
        );
        assert_eq!(error_kind_for_type("api_error"), ErrorKind::Other);
    }
}
