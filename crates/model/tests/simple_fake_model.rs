use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use serde_json::json;
use tokio::time::{Sleep, sleep};
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

#[derive(Debug)]
struct FakeModelProviderError(ErrorKind);

impl Display for FakeModelProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeModelProviderError {}

impl ModelProviderError for FakeModelProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Echoes the last user input word by word, and asks for a `lookup` tool
/// when the input ends with a question mark.
#[derive(Debug)]
struct FakeModelResponse {
    fake_items: VecDeque<ModelResponseEvent>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeModelResponse {
    fn new(input: &str) -> Self {
        let mut fake_items: VecDeque<_> = format!("You said {}", input)
            .split(" ")
            .map(|word| ModelResponseEvent::MessageDelta(word.to_string()))
            .collect();
        fake_items.push_back(ModelResponseEvent::TextBlockEnd);
        let finish_reason = if input.ends_with('?') {
            fake_items.push_back(ModelResponseEvent::ToolCall(
                ToolCallRequest {
                    id: "lookup:0".to_owned(),
                    name: "lookup".to_owned(),
                    arguments: json!({ "query": input }),
                },
            ));
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        };
        fake_items.push_back(ModelResponseEvent::Completed(finish_reason));
        Self {
            fake_items,
            sleep: None,
        }
    }
}

impl ModelResponse for FakeModelResponse {
    type Error = FakeModelProviderError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;
            return Poll::Ready(Ok(this.fake_items.pop_front()));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_event(cx)
    }
}

struct FakeModelProvider;

impl ModelProvider for FakeModelProvider {
    type Error = FakeModelProviderError;
    type Response = FakeModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_input = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.as_str()),
            _ => None,
        });
        let result = match last_input {
            Some(input) => Ok(FakeModelResponse::new(input)),
            None => Err(FakeModelProviderError(ErrorKind::InvalidRequest)),
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    async fn collect(
        mut resp: FakeModelResponse,
    ) -> (String, Vec<ToolCallRequest>, Option<ModelFinishReason>) {
        let mut resp_message = String::new();
        let mut tool_calls = vec![];
        let mut finish_reason = None;
        loop {
            let resp_fut =
                poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx));
            match resp_fut.await {
                Ok(Some(event)) => match event {
                    ModelResponseEvent::MessageDelta(delta) => {
                        if !resp_message.is_empty() {
                            resp_message.push(' ');
                        }
                        resp_message.push_str(&delta);
                    }
                    ModelResponseEvent::TextBlockEnd => {}
                    ModelResponseEvent::ToolCall(req) => tool_calls.push(req),
                    ModelResponseEvent::Completed(reason) => {
                        finish_reason = Some(reason);
                    }
                },
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }
        (resp_message, tool_calls, finish_reason)
    }

    #[tokio::test]
    async fn test_completion() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![
                ModelMessage::System("Be brief.".to_string()),
                ModelMessage::User("Good morning".to_string()),
            ],
            tools: vec![],
            max_tokens: Some(16),
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (message, tool_calls, finish_reason) = collect(resp).await;

        assert_eq!(message, "You said Good morning");
        assert!(tool_calls.is_empty());
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_tool_call() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![ModelMessage::User("Where is it?".to_string())],
            tools: vec![],
            max_tokens: None,
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (_, tool_calls, finish_reason) = collect(resp).await;

        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].arguments, json!({ "query": "Where is it?" }));
        assert_eq!(finish_reason, Some(ModelFinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_error() {
        let provider = FakeModelProvider;
        let req = ModelRequest::default();
        let result = provider.send_request(&req).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(!err.kind().is_retryable());
    }
}
