use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Features the provider announced during negotiation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProviderCapabilities {
    /// The provider serves a tool catalog.
    pub tools: bool,
    /// The provider serves resources.
    pub resources: bool,
}

/// Describes a tool offered by the provider.
///
/// Names are unique within a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Name of the tool.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the accepted arguments.
    #[serde(default)]
    pub input_schema: Value,
}

/// Describes a resource offered by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Address of the resource.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Media type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// The textual content of a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    /// Address of the resource.
    pub uri: String,
    /// Media type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// The content. Multi-part resources are joined with new lines.
    pub text: String,
}

/// One part of a tool output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64 encoded image.
    Image {
        /// Encoded image data.
        data: String,
        /// Media type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The raw resource object.
        resource: Value,
    },
}

/// The raw result of a tool invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Content parts in the order the tool produced them.
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Whether the tool reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    /// Creates a successful output with a single text part.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a failed output with a single text part.
    #[inline]
    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Renders the output as model-readable text.
    ///
    /// Text parts are joined with new lines, other parts are replaced by
    /// a short placeholder.
    pub fn to_text(&self) -> String {
        let mut rendered = String::new();
        for part in &self.content {
            if !rendered.is_empty() {
                rendered.push('\n');
            }
            match part {
                ToolContent::Text { text } => rendered.push_str(text),
                ToolContent::Image { mime_type, .. } => {
                    rendered.push_str(&format!("[image: {mime_type}]"));
                }
                ToolContent::Resource { resource } => {
                    match resource.get("text").and_then(Value::as_str) {
                        Some(text) => rendered.push_str(text),
                        None => rendered.push_str("[resource]"),
                    }
                }
            }
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tool_descriptor_wire_form() {
        let tool: ToolDescriptor = serde_json::from_value(json!({
            "name": "lookupOrder",
            "inputSchema": {
                "properties": { "id": { "type": "number" } }
            }
        }))
        .unwrap();
        assert_eq!(tool.name, "lookupOrder");
        assert_eq!(tool.description, None);
        assert!(tool.input_schema["properties"]["id"].is_object());
    }

    #[test]
    fn test_render_output() {
        let output: ToolOutput = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "shipped" },
                { "type": "image", "data": "AAAA", "mimeType": "image/png" },
                {
                    "type": "resource",
                    "resource": { "uri": "order://7", "text": "tracking: 42" }
                }
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(
            output.to_text(),
            "shipped\n[image: image/png]\ntracking: 42"
        );
    }

    #[test]
    fn test_error_output() {
        let output = ToolOutput::error("order not found");
        assert!(output.is_error);
        assert_eq!(output.to_text(), "order not found");
    }
}
