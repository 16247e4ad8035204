use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

use crate::{PresetEvent, PresetResponse};

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn new(preset: PresetResponse, delay: Duration) -> Self {
        let finish_reason = if preset.has_tool_calls() {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        };
        let mut events: VecDeque<_> = preset
            .events
            .into_iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg)
                }
                PresetEvent::TextBlockEnd => ModelResponseEvent::TextBlockEnd,
                PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req),
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(finish_reason));
        Self {
            events,
            delay,
            sleep: None,
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::model::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
            return Poll::Ready(Ok(this.events.pop_front()));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    fallback: Option<PresetResponse>,
    requests: Vec<ModelRequest>,
    delay: Option<Duration>,
}

/// A local fake model for testing purpose.
///
/// Responses are handed out in the order they were pushed, one per request.
/// Clones share the same script, so a test can keep a handle to inspect
/// the recorded requests after giving the provider away. When the script
/// runs dry, the fallback response is used if there is one; otherwise the
/// request fails with [`ErrorKind::InvalidRequest`].
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
}

impl TestModelProvider {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn push_response(&self, preset: PresetResponse) {
        self.script().responses.push_back(preset);
    }

    /// Sets the response used once the scripted ones are consumed.
    #[inline]
    pub fn set_fallback_response(&self, preset: PresetResponse) {
        self.script().fallback = Some(preset);
    }

    /// Sets the delay before each streamed event.
    #[inline]
    pub fn set_delay(&self, duration: Duration) {
        self.script().delay = Some(duration);
    }

    /// Returns every request received so far, including failed ones.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script().requests.clone()
    }

    /// Returns how many scripted responses are left.
    pub fn remaining(&self) -> usize {
        self.script().responses.len()
    }

    fn next_response(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        let mut script = self.script();
        script.requests.push(req.clone());
        let delay = script.delay.unwrap_or(Duration::from_millis(1));

        if let Some(front) = script.responses.front_mut() {
            match front.failures {
                Some(0) => {
                    return Err(Error {
                        message: "preset failure",
                        kind: ErrorKind::RateLimitExceeded,
                    });
                }
                Some(n) => {
                    front.failures = Some(n - 1).filter(|n| *n > 0);
                    return Err(Error {
                        message: "preset failure",
                        kind: ErrorKind::RateLimitExceeded,
                    });
                }
                None => {}
            }
        }
        let preset = match script.responses.pop_front() {
            Some(preset) => preset,
            None => script.fallback.clone().ok_or(Error {
                message: "script exhausted",
                kind: ErrorKind::InvalidRequest,
            })?,
        };
        Ok(TestModelResponse::new(preset, delay))
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::model::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.next_response(req))
    }
}
