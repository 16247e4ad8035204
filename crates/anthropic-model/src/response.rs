use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::Value;
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use toolchat_sse::Sse;

use crate::Error;
use crate::proto::{BlockDelta, StartBlock, StreamEvent};

struct PartialToolUse {
    id: String,
    name: String,
    input: Value,
    input_json: String,
}

impl PartialToolUse {
    fn finish(self) -> Result<ToolCallRequest, Error> {
        // The initial `input` is a placeholder when deltas follow.
        let arguments = if self.input_json.trim().is_empty() {
            match self.input {
                Value::Null => Value::Object(Default::default()),
                input => input,
            }
        } else {
            serde_json::from_str(&self.input_json).map_err(|err| {
                Error::new(
                    format!("invalid input for tool `{}`: {err}", self.name),
                    ErrorKind::Other,
                )
            })?
        };
        Ok(ToolCallRequest {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

struct PartialState {
    sse: Sse,
    text_blocks: HashSet<u32>,
    tool_blocks: HashMap<u32, PartialToolUse>,
    // Events decoded from the stream but not yet returned to the caller.
    pending_events: VecDeque<ModelResponseEvent>,
    finish_reason: Option<ModelFinishReason>,
    stopped: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct AnthropicResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl AnthropicResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            text_blocks: Default::default(),
            tool_blocks: Default::default(),
            pending_events: Default::default(),
            finish_reason: None,
            stopped: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for AnthropicResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.stopped {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                return Err(Error::new(
                    "stream ended before `message_stop`",
                    ErrorKind::Other,
                ));
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {}", sse_event.data);

        let stream_event = serde_json::from_str::<StreamEvent>(&sse_event.data)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        apply_event(&mut partial_state, stream_event)?;
    }
}

fn apply_event(
    state: &mut PartialState,
    event: StreamEvent,
) -> Result<(), Error> {
    match event {
        StreamEvent::MessageStart { message } => {
            debug!("message started: {}", message.id);
        }
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            StartBlock::Text { text } => {
                state.text_blocks.insert(index);
                if !text.is_empty() {
                    state
                        .pending_events
                        .push_back(ModelResponseEvent::MessageDelta(text));
                }
            }
            StartBlock::ToolUse { id, name, input } => {
                state.tool_blocks.insert(
                    index,
                    PartialToolUse {
                        id,
                        name,
                        input,
                        input_json: String::new(),
                    },
                );
            }
            StartBlock::Other => {
                trace!("ignoring content block {index}");
            }
        },
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => {
                state
                    .pending_events
                    .push_back(ModelResponseEvent::MessageDelta(text));
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                let Some(tool_use) = state.tool_blocks.get_mut(&index) else {
                    return Err(Error::new(
                        format!("input delta for unknown block {index}"),
                        ErrorKind::Other,
                    ));
                };
                tool_use.input_json.push_str(&partial_json);
            }
            BlockDelta::Other => {}
        },
        StreamEvent::ContentBlockStop { index } => {
            if state.text_blocks.remove(&index) {
                state
                    .pending_events
                    .push_back(ModelResponseEvent::TextBlockEnd);
            } else if let Some(tool_use) = state.tool_blocks.remove(&index) {
                let request = tool_use.finish()?;
                state
                    .pending_events
                    .push_back(ModelResponseEvent::ToolCall(request));
            }
        }
        StreamEvent::MessageDelta { delta } => {
            if let Some(stop_reason) = delta.stop_reason {
                state.finish_reason = Some(match stop_reason.as_str() {
                    "tool_use" => ModelFinishReason::ToolCalls,
                    "max_tokens" => ModelFinishReason::MaxTokens,
                    _ => ModelFinishReason::Stop,
                });
            }
        }
        StreamEvent::MessageStop => {
            let reason = state.finish_reason.unwrap_or(ModelFinishReason::Stop);
            state
                .pending_events
                .push_back(ModelResponseEvent::Completed(reason));
            state.stopped = true;
        }
        StreamEvent::Ping | StreamEvent::Unknown => {}
        StreamEvent::Error { error } => {
            let kind = crate::error_kind_for_type(&error.kind);
            return Err(Error::new(error.message, kind));
        }
    }
    Ok(())
}
