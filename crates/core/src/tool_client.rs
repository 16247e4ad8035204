use async_trait::async_trait;
use serde_json::{Map, Value};
use toolchat_model::ModelTool;
use toolchat_tool_provider::{
    ProviderCapabilities, ResourceContent, ResourceDescriptor, ToolDescriptor,
    ToolOutput, ToolProvider, ToolProviderError, ToolSession,
};

pub(crate) type BoxedToolError = Box<dyn ToolProviderError>;

fn boxed<E: ToolProviderError>(err: E) -> BoxedToolError {
    Box::new(err)
}

/// Object-safe form of [`ToolProvider`].
#[async_trait]
pub(crate) trait ProviderObject: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn SessionObject>, BoxedToolError>;
}

/// Object-safe form of [`ToolSession`].
#[async_trait]
pub(crate) trait SessionObject: Send + Sync + 'static {
    fn capabilities(&self) -> ProviderCapabilities;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BoxedToolError>;

    async fn list_resources(
        &self,
    ) -> Result<Vec<ResourceDescriptor>, BoxedToolError>;

    async fn read_resource(
        &self,
        uri: &str,
    ) -> Result<ResourceContent, BoxedToolError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, BoxedToolError>;
}

pub(crate) struct AnyProvider<P: ToolProvider>(pub P);

#[async_trait]
impl<P: ToolProvider + 'static> ProviderObject for AnyProvider<P> {
    async fn connect(&self) -> Result<Box<dyn SessionObject>, BoxedToolError> {
        let session = self.0.connect().await.map_err(boxed)?;
        Ok(Box::new(AnySession(session)))
    }
}

struct AnySession<S: ToolSession>(S);

#[async_trait]
impl<S: ToolSession> SessionObject for AnySession<S> {
    #[inline]
    fn capabilities(&self) -> ProviderCapabilities {
        self.0.capabilities()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BoxedToolError> {
        self.0.list_tools().await.map_err(boxed)
    }

    async fn list_resources(
        &self,
    ) -> Result<Vec<ResourceDescriptor>, BoxedToolError> {
        self.0.list_resources().await.map_err(boxed)
    }

    async fn read_resource(
        &self,
        uri: &str,
    ) -> Result<ResourceContent, BoxedToolError> {
        self.0.read_resource(uri).await.map_err(boxed)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, BoxedToolError> {
        self.0.call_tool(name, arguments).await.map_err(boxed)
    }
}

/// Converts a tool descriptor into the definition offered to the model.
///
/// The model API only takes object schemas, so `"type": "object"` is
/// filled in when the provider left it out.
pub(crate) fn model_tool(descriptor: &ToolDescriptor) -> ModelTool {
    let parameters = match &descriptor.input_schema {
        Value::Object(schema) => {
            let mut schema = schema.clone();
            schema
                .entry("type")
                .or_insert_with(|| Value::String("object".to_owned()));
            Value::Object(schema)
        }
        _ => {
            let mut schema = Map::new();
            schema.insert("type".to_owned(), Value::String("object".to_owned()));
            schema.insert("properties".to_owned(), Value::Object(Map::new()));
            Value::Object(schema)
        }
    };
    ModelTool {
        name: descriptor.name.clone(),
        description: descriptor.description.clone().unwrap_or_default(),
        parameters,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolchat_test_support::TestToolProvider;

    use super::*;

    #[test]
    fn test_schema_normalization() {
        let mut descriptor = ToolDescriptor {
            name: "lookupOrder".to_owned(),
            description: None,
            input_schema: json!({ "properties": { "id": { "type": "number" } } }),
        };
        let tool = model_tool(&descriptor);
        assert_eq!(tool.description, "");
        assert_eq!(
            tool.parameters,
            json!({ "type": "object", "properties": { "id": { "type": "number" } } })
        );

        descriptor.input_schema = Value::Null;
        assert_eq!(
            model_tool(&descriptor).parameters,
            json!({ "type": "object", "properties": {} })
        );
    }

    #[tokio::test]
    async fn test_erased_session() {
        let provider = TestToolProvider::default();
        provider.add_tool("lookupOrder", "Finds an order");
        let erased: Box<dyn ProviderObject> =
            Box::new(AnyProvider(provider.clone()));

        let session = erased.connect().await.unwrap();
        assert!(session.capabilities().tools);
        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "lookupOrder");

        let err = session.call_tool("missing", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), toolchat_tool_provider::ErrorKind::Server);
        assert_eq!(provider.connect_count(), 1);
    }
}
