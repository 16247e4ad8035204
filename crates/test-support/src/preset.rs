use toolchat_model::ToolCallRequest;
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "text_block_end")]
    TextBlockEnd,
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// One scripted model response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failure` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// A response made of a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_events([
            PresetEvent::MessageDelta(text.into()),
            PresetEvent::TextBlockEnd,
        ])
    }

    /// A response with a leading text block followed by tool calls.
    ///
    /// Call ids are derived from the tool names and their position.
    pub fn tool_calls<'a>(
        text: impl Into<String>,
        calls: impl IntoIterator<Item = (&'a str, serde_json::Value)>,
    ) -> Self {
        let mut events = vec![
            PresetEvent::MessageDelta(text.into()),
            PresetEvent::TextBlockEnd,
        ];
        events.extend(calls.into_iter().enumerate().map(
            |(idx, (name, arguments))| {
                PresetEvent::ToolCall(ToolCallRequest {
                    id: format!("{name}:{idx}"),
                    name: name.to_owned(),
                    arguments,
                })
            },
        ));
        Self::with_events(events)
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    pub(crate) fn has_tool_calls(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tool_calls_preset() {
        let response = PresetResponse::tool_calls(
            "Checking both.",
            [("lookupOrder", json!({ "id": 1 })), ("listOrders", json!({}))],
        );
        assert!(response.has_tool_calls());
        assert_eq!(response.events.len(), 4);
        let PresetEvent::ToolCall(second) = &response.events[3] else {
            panic!("expected a tool call");
        };
        assert_eq!(second.id, "listOrders:1");

        let serialized = serde_json::to_string(&response).unwrap();
        assert!(serialized.contains("\"type\":\"text_block_end\""));
    }
}
