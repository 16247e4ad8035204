use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use backoff::ExponentialBackoffBuilder;
use toolchat_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

use crate::config::RetryConfig;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn = Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that drains streamed responses and
/// provides a type-erased interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits for the complete response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(&self, req: ModelRequest) -> SendRequestResult {
        (self.handler_fn)(req).await
    }

    /// Like [`send_request`](Self::send_request), but retries errors whose
    /// kind is retryable with exponential backoff.
    pub async fn send_request_with_retry(
        &self,
        req: ModelRequest,
        retry: &RetryConfig,
    ) -> SendRequestResult {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(retry.initial_interval)
            .with_max_interval(retry.max_interval)
            .with_max_elapsed_time(Some(retry.max_elapsed_time))
            .build();
        backoff::future::retry(policy, || {
            let fut = (self.handler_fn)(req.clone());
            async move {
                match fut.await {
                    Ok(resp) => Ok(resp),
                    Err(err) if err.kind().is_retryable() => {
                        warn!("model call failed, retrying: {err}");
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }
}

/// One content block of a response, in the order the model produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBlock {
    Text(String),
    ToolCall(ToolCallRequest),
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    pub blocks: Vec<ResponseBlock>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut blocks = Vec::new();
    let mut text = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                text.push_str(&delta);
            }
            ModelResponseEvent::TextBlockEnd => {
                flush_text(&mut text, &mut blocks);
            }
            ModelResponseEvent::ToolCall(req) => {
                flush_text(&mut text, &mut blocks);
                blocks.push(ResponseBlock::ToolCall(req));
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }
    // Providers may finish without closing the last text block.
    flush_text(&mut text, &mut blocks);

    trace!("finished a request");

    Ok(ModelClientResponse {
        blocks,
        finish_reason,
    })
}

fn flush_text(text: &mut String, blocks: &mut Vec<ResponseBlock>) {
    if !text.is_empty() {
        blocks.push(ResponseBlock::Text(std::mem::take(text)));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use toolchat_model::{ErrorKind, ModelMessage};
    use toolchat_test_support::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_blocks_keep_order() {
        let model_provider = TestModelProvider::default();
        model_provider.push_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("How ".to_owned()),
            PresetEvent::MessageDelta("are you?".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "t1".to_owned(),
                name: "lookupOrder".to_owned(),
                arguments: json!({ "id": 7 }),
            }),
            PresetEvent::MessageDelta("Done.".to_owned()),
        ]));

        let model_client = ModelClient::new(model_provider);
        let resp = model_client.send_request(request()).await.unwrap();
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
        assert_eq!(resp.blocks.len(), 3);
        assert_eq!(resp.blocks[0], ResponseBlock::Text("How are you?".to_owned()));
        assert!(matches!(&resp.blocks[1], ResponseBlock::ToolCall(req) if req.id == "t1"));
        assert_eq!(resp.blocks[2], ResponseBlock::Text("Done.".to_owned()));
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let err = model_client.send_request(request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rate_limited() {
        let model_provider = TestModelProvider::default();
        model_provider.push_response(PresetResponse::text("Hello").with_failures(2));
        let model_client = ModelClient::new(model_provider.clone());

        let retry = RetryConfig {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(50),
            max_elapsed_time: Duration::from_secs(5),
        };
        let resp = model_client
            .send_request_with_retry(request(), &retry)
            .await
            .unwrap();
        assert_eq!(resp.blocks, [ResponseBlock::Text("Hello".to_owned())]);
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_for_permanent_errors() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider.clone());
        let err = model_client
            .send_request_with_retry(request(), &RetryConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(model_provider.requests().len(), 1);
    }
}
