use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolchat_model::{ModelMessage, ModelRequest, ModelTool, Role};

use crate::AnthropicConfig;

pub const API_VERSION: &str = "2023-06-01";

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageStart {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageDeltaBody {
    pub stop_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    stream: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &AnthropicConfig,
) -> MessagesRequest {
    let mut system: Option<String> = None;
    let mut messages: Vec<Message> = Vec::with_capacity(req.messages.len());

    for msg in &req.messages {
        let (role, block) = match msg {
            ModelMessage::System(content) => {
                // System turns are not part of `messages` in this API.
                let system = system.get_or_insert_default();
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(content);
                continue;
            }
            ModelMessage::User(text) | ModelMessage::Assistant(text) => {
                (msg.role(), ContentBlock::Text { text: text.clone() })
            }
            ModelMessage::ToolUse(call) => (
                Role::Assistant,
                ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: match &call.arguments {
                        Value::Null => Value::Object(Default::default()),
                        arguments => arguments.clone(),
                    },
                },
            ),
            ModelMessage::ToolResult(result) => (
                Role::User,
                ContentBlock::ToolResult {
                    tool_use_id: result.id.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                },
            ),
        };
        let role = match role {
            Role::Assistant => "assistant",
            _ => "user",
        };

        // Consecutive turns of one role are folded into a single message.
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.push(block),
            _ => messages.push(Message {
                role,
                content: vec![block],
            }),
        }
    }

    MessagesRequest {
        model: config.model.clone(),
        max_tokens: req.max_tokens.unwrap_or(config.default_max_tokens),
        system,
        messages,
        tools: req.tools.iter().map(create_tool).collect(),
        stream: true,
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolchat_model::{ToolCallRequest, ToolCallResult};

    use super::*;
    use crate::AnthropicConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a helpful assistant.".to_owned()),
                ModelMessage::User("Where is order 7?".to_owned()),
                ModelMessage::ToolUse(ToolCallRequest {
                    id: "t1".to_owned(),
                    name: "lookupOrder".to_owned(),
                    arguments: json!({ "id": 7 }),
                }),
                ModelMessage::ToolResult(ToolCallResult {
                    id: "t1".to_owned(),
                    content: "shipped".to_owned(),
                    is_error: false,
                }),
            ],
            tools: vec![ModelTool {
                name: "lookupOrder".to_owned(),
                description: "Looks up an order.".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
            max_tokens: Some(1000),
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();

        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "max_tokens": 1000,
                "system": "You are a helpful assistant.",
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            { "type": "text", "text": "Where is order 7?" }
                        ]
                    },
                    {
                        "role": "assistant",
                        "content": [{
                            "type": "tool_use",
                            "id": "t1",
                            "name": "lookupOrder",
                            "input": { "id": 7 }
                        }]
                    },
                    {
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": "t1",
                            "content": "shipped"
                        }]
                    }
                ],
                "tools": [{
                    "name": "lookupOrder",
                    "description": "Looks up an order.",
                    "input_schema": { "type": "object" }
                }],
                "stream": true
            })
        );
    }

    #[test]
    fn test_fold_same_role_and_defaults() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::ToolResult(ToolCallResult {
                    id: "t1".to_owned(),
                    content: "boom".to_owned(),
                    is_error: true,
                }),
                ModelMessage::User("And now?".to_owned()),
            ],
            tools: vec![],
            max_tokens: None,
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx")
            .with_default_max_tokens(512)
            .build();

        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"][0]["is_error"], true);
        assert_eq!(messages[0]["content"][1]["text"], "And now?");
    }

    #[test]
    fn test_parse_stream_events() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t1","name":"lookupOrder","input":{}}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: StartBlock::ToolUse {
                    id: "t1".to_owned(),
                    name: "lookupOrder".to_owned(),
                    input: json!({}),
                },
            }
        );

        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"something_new"}"#).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }
}
