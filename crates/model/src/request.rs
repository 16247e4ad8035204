use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
    /// Upper bound of output tokens. Providers fall back to their own
    /// default when this is `None`.
    pub max_tokens: Option<u32>,
}

/// The role of the party a message is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// The human side of the conversation (tool results included).
    User,
    /// The model side of the conversation.
    Assistant,
}

/// A complete message, i.e. one turn of the conversation.
///
/// The order of messages is significant. A [`ModelMessage::ToolUse`] must
/// be immediately followed by the [`ModelMessage::ToolResult`] carrying the
/// same id, otherwise providers will reject the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
    /// A tool invocation issued by the assistant.
    ToolUse(ToolCallRequest),
    /// A tool call result, sent back on the user side.
    ToolResult(ToolCallResult),
}

impl ModelMessage {
    /// Returns the role this message is attributed to.
    #[inline]
    pub fn role(&self) -> Role {
        match self {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) | ModelMessage::ToolResult(_) => Role::User,
            ModelMessage::Assistant(_) | ModelMessage::ToolUse(_) => {
                Role::Assistant
            }
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
    /// Whether the content describes a failure.
    #[serde(default)]
    pub is_error: bool,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_roles() {
        let tool_use = ModelMessage::ToolUse(ToolCallRequest {
            id: "t1".to_owned(),
            name: "lookupOrder".to_owned(),
            arguments: json!({ "id": 7 }),
        });
        let tool_result = ModelMessage::ToolResult(ToolCallResult {
            id: "t1".to_owned(),
            content: "shipped".to_owned(),
            is_error: false,
        });
        assert_eq!(tool_use.role(), Role::Assistant);
        assert_eq!(tool_result.role(), Role::User);
        assert_eq!(ModelMessage::System("".to_owned()).role(), Role::System);
    }

    #[test]
    fn test_persisted_form() {
        let msg = ModelMessage::User("Hello".to_owned());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({ "type": "user", "data": "Hello" }));

        let restored: ModelMessage = serde_json::from_value(json!({
            "type": "tool_result",
            "data": { "id": "t1", "content": "shipped" }
        }))
        .unwrap();
        assert_eq!(
            restored,
            ModelMessage::ToolResult(ToolCallResult {
                id: "t1".to_owned(),
                content: "shipped".to_owned(),
                is_error: false,
            })
        );
    }
}
