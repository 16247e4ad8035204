use toolchat_core::conversation::Conversation;
use toolchat_core::{
    ContextSelector, Error, Orchestrator, OrchestratorBuilder, ProcessOutcome,
};
use toolchat_model::ModelProvider;
use toolchat_tool_provider::{ToolDescriptor, ToolProvider};

/// A chat session builder.
///
/// See [`ChatSession`].
pub struct ChatSessionBuilder {
    orchestrator_builder: OrchestratorBuilder,
}

impl ChatSessionBuilder {
    /// Creates a session builder with the specified providers.
    pub fn with_providers<M, T>(model_provider: M, tool_provider: T) -> Self
    where
        M: ModelProvider + 'static,
        T: ToolProvider + 'static,
    {
        let orchestrator_builder =
            OrchestratorBuilder::with_providers(model_provider, tool_provider);
        Self {
            orchestrator_builder,
        }
    }

    /// Sets how many nested rounds of tool calls run per message.
    #[inline]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.max_tool_rounds(rounds);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> ChatSession {
        ChatSession::with_orchestrator(self.orchestrator_builder.build())
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session keeps the history and the selected client, and is basically
/// a wrapper around [`Orchestrator`]. Sessions created from clones of one
/// orchestrator share its tool-provider connection.
pub struct ChatSession {
    orchestrator: Orchestrator,
    conversation: Conversation,
}

impl ChatSession {
    /// Creates a session on top of an existing orchestrator.
    #[inline]
    pub fn with_orchestrator(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            conversation: Conversation::default(),
        }
    }

    /// Sends a message and records the answer in the history.
    ///
    /// On failure the history is left untouched.
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<ProcessOutcome, Error> {
        let outcome = self
            .orchestrator
            .process_message(
                message,
                self.conversation.context(),
                self.conversation.turns(),
            )
            .await?;
        if outcome.tool_rounds_exhausted {
            warn!("the answer was cut short by the tool round limit");
        }
        self.conversation.record(&outcome);
        Ok(outcome)
    }

    /// Selects the client the conversation is about.
    #[inline]
    pub fn select_client(&mut self, client: ContextSelector) {
        debug!("selected client {} ({})", client.name, client.id);
        self.conversation.set_context(Some(client));
    }

    /// Clears the selected client.
    #[inline]
    pub fn clear_client(&mut self) {
        self.conversation.set_context(None);
    }

    /// Returns the selected client.
    #[inline]
    pub fn client(&self) -> Option<&ContextSelector> {
        self.conversation.context()
    }

    /// Connects to the tool provider and returns its tool catalog.
    pub async fn tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        self.orchestrator.connect().await?;
        Ok(self.orchestrator.tools())
    }

    /// Returns the tool round limit of the underlying orchestrator.
    #[inline]
    pub fn max_tool_rounds(&self) -> usize {
        self.orchestrator.config().max_tool_rounds
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolchat_model::ModelMessage;
    use toolchat_test_support::{
        PresetResponse, TestModelProvider, TestToolProvider,
    };

    use super::*;

    #[tokio::test]
    async fn test_chat_keeps_history() {
        let model_provider = TestModelProvider::default();
        model_provider.push_response(PresetResponse::tool_calls(
            "Checking.",
            [("lookupOrder", json!({ "id": 7 }))],
        ));
        model_provider.push_response(PresetResponse::text("It shipped."));
        model_provider.push_response(PresetResponse::text("You're welcome."));
        let tool_provider = TestToolProvider::default();
        tool_provider.add_tool("lookupOrder", "Looks up an order");

        let mut session =
            ChatSessionBuilder::with_providers(model_provider.clone(), tool_provider)
                .with_max_tool_rounds(1)
                .build();
        session.select_client(ContextSelector::new("3", "BMW"));
        assert_eq!(session.tools().await.unwrap().len(), 1);

        let outcome = session.send_message("Where is order 7?").await.unwrap();
        assert!(outcome.text.ends_with("It shipped."));
        session.send_message("Thanks").await.unwrap();

        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 6);
        assert!(matches!(&turns[4], ModelMessage::User(text) if text == "Thanks"));
        assert!(matches!(
            &turns[5],
            ModelMessage::Assistant(text) if text == "You're welcome."
        ));
        assert_eq!(session.client().map(|c| c.id.as_str()), Some("3"));
    }

    #[tokio::test]
    async fn test_failed_message_keeps_history() {
        let model_provider = TestModelProvider::default();
        model_provider.push_response(PresetResponse::text("Hello."));
        let mut session = ChatSessionBuilder::with_providers(
            model_provider,
            TestToolProvider::default(),
        )
        .build();

        session.send_message("Hi").await.unwrap();
        assert!(session.send_message("Still there?").await.is_err());
        assert_eq!(session.conversation().turns().len(), 2);

        session.clear_client();
        assert!(session.client().is_none());
    }
}
