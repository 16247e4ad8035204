use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::sleep;
use toolchat_tool_provider::{
    ErrorKind, ProviderCapabilities, ResourceContent, ResourceDescriptor,
    ToolDescriptor, ToolOutput, ToolProvider, ToolProviderError, ToolSession,
};

#[derive(Debug)]
pub struct ToolError {
    message: String,
    kind: ErrorKind,
}

impl ToolError {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for ToolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for ToolError {}

impl ToolProviderError for ToolError {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

enum ToolBehavior {
    Output(ToolOutput),
    Fail,
}

struct FakeResource {
    descriptor: ResourceDescriptor,
    text: Option<String>,
}

struct Catalog {
    capabilities: ProviderCapabilities,
    tools: Vec<ToolDescriptor>,
    behaviors: HashMap<String, ToolBehavior>,
    resources: Vec<FakeResource>,
    failing_connects: usize,
    connect_delay: Option<Duration>,
    call_delay: Option<Duration>,
}

#[derive(Default)]
struct Journal {
    tool_calls: Vec<(String, Value)>,
    resource_reads: Vec<String>,
}

struct Shared {
    catalog: Mutex<Catalog>,
    journal: Mutex<Journal>,
    connects: AtomicUsize,
    sessions: AtomicUsize,
    list_tools_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A local fake tool provider for testing purpose.
///
/// Clones share the same catalog and counters. Tools that were added
/// without a configured output answer with `"<name> done"`.
#[derive(Clone)]
pub struct TestToolProvider {
    shared: Arc<Shared>,
}

impl Default for TestToolProvider {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog: Mutex::new(Catalog {
                    capabilities: ProviderCapabilities {
                        tools: true,
                        resources: true,
                    },
                    tools: vec![],
                    behaviors: HashMap::new(),
                    resources: vec![],
                    failing_connects: 0,
                    connect_delay: None,
                    call_delay: None,
                }),
                journal: Mutex::default(),
                connects: AtomicUsize::new(0),
                sessions: AtomicUsize::new(0),
                list_tools_calls: AtomicUsize::new(0),
            }),
        }
    }
}

impl TestToolProvider {
    /// Adds a tool with an empty object schema.
    pub fn add_tool(&self, name: &str, description: &str) {
        self.add_tool_descriptor(ToolDescriptor {
            name: name.to_owned(),
            description: Some(description.to_owned()),
            input_schema: json!({ "type": "object", "properties": {} }),
        });
    }

    pub fn add_tool_descriptor(&self, descriptor: ToolDescriptor) {
        lock(&self.shared.catalog).tools.push(descriptor);
    }

    /// Sets what invoking `name` returns.
    pub fn set_tool_output(&self, name: &str, output: ToolOutput) {
        lock(&self.shared.catalog)
            .behaviors
            .insert(name.to_owned(), ToolBehavior::Output(output));
    }

    /// Makes invoking `name` fail at the protocol level.
    pub fn set_tool_failure(&self, name: &str) {
        lock(&self.shared.catalog)
            .behaviors
            .insert(name.to_owned(), ToolBehavior::Fail);
    }

    /// Adds a resource at `resource://<lowercased name>`.
    pub fn add_resource(&self, name: &str, text: &str) {
        self.push_resource(name, Some(text.to_owned()));
    }

    /// Adds a resource that is listed but can't be read.
    pub fn add_broken_resource(&self, name: &str) {
        self.push_resource(name, None);
    }

    fn push_resource(&self, name: &str, text: Option<String>) {
        let descriptor = ResourceDescriptor {
            uri: format!("resource://{}", name.to_lowercase()),
            name: name.to_owned(),
            description: None,
            mime_type: Some("text/plain".to_owned()),
        };
        lock(&self.shared.catalog)
            .resources
            .push(FakeResource { descriptor, text });
    }

    pub fn set_capabilities(&self, capabilities: ProviderCapabilities) {
        lock(&self.shared.catalog).capabilities = capabilities;
    }

    /// Makes the next `count` connects fail with a transport error.
    pub fn fail_next_connects(&self, count: usize) {
        lock(&self.shared.catalog).failing_connects = count;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.shared.catalog).connect_delay = Some(delay);
    }

    /// Sets the delay before each tool invocation completes.
    pub fn set_call_delay(&self, delay: Duration) {
        lock(&self.shared.catalog).call_delay = Some(delay);
    }

    /// Returns how many connects were attempted.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Returns how many sessions were established.
    pub fn session_count(&self) -> usize {
        self.shared.sessions.load(Ordering::SeqCst)
    }

    pub fn list_tools_count(&self) -> usize {
        self.shared.list_tools_calls.load(Ordering::SeqCst)
    }

    /// Returns every tool invocation as `(name, arguments)`.
    pub fn tool_calls(&self) -> Vec<(String, Value)> {
        lock(&self.shared.journal).tool_calls.clone()
    }

    /// Returns every URI that was read.
    pub fn resource_reads(&self) -> Vec<String> {
        lock(&self.shared.journal).resource_reads.clone()
    }
}

impl Debug for TestToolProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestToolProvider")
            .field("connects", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl ToolProvider for TestToolProvider {
    type Error = ToolError;
    type Session = TestToolSession;

    async fn connect(&self) -> Result<TestToolSession, ToolError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let delay = lock(&self.shared.catalog).connect_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        {
            let mut catalog = lock(&self.shared.catalog);
            if catalog.failing_connects > 0 {
                catalog.failing_connects -= 1;
                return Err(ToolError::new(
                    "connection refused",
                    ErrorKind::Transport,
                ));
            }
        }
        self.shared.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(TestToolSession {
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct TestToolSession {
    shared: Arc<Shared>,
}

impl ToolSession for TestToolSession {
    type Error = ToolError;

    fn capabilities(&self) -> ProviderCapabilities {
        lock(&self.shared.catalog).capabilities
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        self.shared.list_tools_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.shared.catalog).tools.clone())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, ToolError> {
        let catalog = lock(&self.shared.catalog);
        if !catalog.capabilities.resources {
            return Err(ToolError::new(
                "resources are not supported",
                ErrorKind::Server,
            ));
        }
        Ok(catalog
            .resources
            .iter()
            .map(|resource| resource.descriptor.clone())
            .collect())
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ToolError> {
        lock(&self.shared.journal).resource_reads.push(uri.to_owned());
        let catalog = lock(&self.shared.catalog);
        let resource = catalog
            .resources
            .iter()
            .find(|resource| resource.descriptor.uri == uri)
            .ok_or_else(|| {
                ToolError::new(format!("unknown resource {uri}"), ErrorKind::Server)
            })?;
        let text = resource.text.clone().ok_or_else(|| {
            ToolError::new(format!("cannot read {uri}"), ErrorKind::Server)
        })?;
        Ok(ResourceContent {
            uri: uri.to_owned(),
            mime_type: resource.descriptor.mime_type.clone(),
            text,
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, ToolError> {
        lock(&self.shared.journal)
            .tool_calls
            .push((name.to_owned(), arguments));
        let delay = lock(&self.shared.catalog).call_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        let catalog = lock(&self.shared.catalog);
        if !catalog.tools.iter().any(|tool| tool.name == name) {
            return Err(ToolError::new(
                format!("unknown tool {name}"),
                ErrorKind::Server,
            ));
        }
        match catalog.behaviors.get(name) {
            Some(ToolBehavior::Output(output)) => Ok(output.clone()),
            Some(ToolBehavior::Fail) => Err(ToolError::new(
                format!("{name} failed"),
                ErrorKind::Server,
            )),
            None => Ok(ToolOutput::text(format!("{name} done"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failures_are_counted() {
        let provider = TestToolProvider::default();
        provider.fail_next_connects(1);
        assert!(provider.connect().await.is_err());
        assert!(provider.connect().await.is_ok());
        assert_eq!(provider.connect_count(), 2);
        assert_eq!(provider.session_count(), 1);
    }

    #[tokio::test]
    async fn test_session_behaviors() {
        let provider = TestToolProvider::default();
        provider.add_tool("lookupOrder", "Finds an order");
        provider.add_tool("cancelOrder", "Cancels an order");
        provider.set_tool_failure("cancelOrder");
        provider.add_resource("BMW", "BMW ships from Munich.");
        provider.add_broken_resource("Ford");

        let session = provider.connect().await.unwrap();
        assert_eq!(session.list_tools().await.unwrap().len(), 2);
        assert_eq!(provider.list_tools_count(), 1);

        let output = session
            .call_tool("lookupOrder", json!({ "id": 1 }))
            .await
            .unwrap();
        assert_eq!(output.to_text(), "lookupOrder done");
        let err = session.call_tool("cancelOrder", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);

        let content = session.read_resource("resource://bmw").await.unwrap();
        assert_eq!(content.text, "BMW ships from Munich.");
        assert!(session.read_resource("resource://ford").await.is_err());
        assert_eq!(
            provider.resource_reads(),
            ["resource://bmw", "resource://ford"]
        );
        assert_eq!(provider.tool_calls().len(), 2);
    }
}
