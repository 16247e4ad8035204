//! Conversation-related types.

use serde::{Deserialize, Serialize};
use toolchat_model::ModelMessage;

use crate::orchestrator::ProcessOutcome;
use crate::prompt::ContextSelector;

/// The caller side of a chat: the turns so far and the selected context.
///
/// Grounding turns are never stored, they are fetched again for every
/// message so the context can change between messages.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    context: Option<ContextSelector>,
    turns: Vec<ModelMessage>,
}

impl Conversation {
    /// Returns the selected context.
    #[inline]
    pub fn context(&self) -> Option<&ContextSelector> {
        self.context.as_ref()
    }

    /// Selects a context, or clears it with `None`.
    #[inline]
    pub fn set_context(&mut self, context: Option<ContextSelector>) {
        self.context = context;
    }

    /// Returns the turns to send as history with the next message.
    #[inline]
    pub fn turns(&self) -> &[ModelMessage] {
        &self.turns
    }

    /// Replaces the history with the outcome of the last message, followed
    /// by an assistant turn carrying its final text.
    pub fn record(&mut self, outcome: &ProcessOutcome) {
        self.turns = outcome.history().to_vec();
        self.turns.push(ModelMessage::Assistant(outcome.text.clone()));
    }

    /// Forgets every turn, keeping the context.
    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use toolchat_test_support::{
        PresetResponse, TestModelProvider, TestToolProvider,
    };

    use super::*;
    use crate::OrchestratorBuilder;

    #[tokio::test]
    async fn test_record_outcomes() {
        let model_provider = TestModelProvider::default();
        model_provider.push_response(PresetResponse::text("Hi!"));
        model_provider.push_response(PresetResponse::text("BMW uses system X."));
        let tool_provider = TestToolProvider::default();
        tool_provider.add_resource("BMW", "BMW uses system X");
        let orchestrator =
            OrchestratorBuilder::with_providers(model_provider.clone(), tool_provider)
                .build();

        let mut conversation = Conversation::default();
        let outcome = orchestrator
            .process_message("Hello", conversation.context(), conversation.turns())
            .await
            .unwrap();
        conversation.record(&outcome);
        assert_eq!(
            conversation.turns(),
            [
                ModelMessage::User("Hello".to_owned()),
                ModelMessage::Assistant("Hi!".to_owned()),
            ]
        );

        conversation.set_context(Some(ContextSelector::new("3", "BMW")));
        let outcome = orchestrator
            .process_message("Which system?", conversation.context(), conversation.turns())
            .await
            .unwrap();
        conversation.record(&outcome);
        // The grounding pair is sent but not kept.
        assert_eq!(outcome.transcript.len(), 5);
        assert_eq!(conversation.turns().len(), 4);
        assert!(matches!(conversation.turns()[0], ModelMessage::User(_)));

        let last_request = model_provider.requests().pop().unwrap();
        assert!(matches!(last_request.messages[1], ModelMessage::ToolUse(_)));

        conversation.clear();
        assert!(conversation.turns().is_empty());
        assert!(conversation.context().is_some());
    }
}
