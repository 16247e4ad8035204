use serde::{Deserialize, Serialize};

const PLACEHOLDER: &str = "{{CONTEXT}}";
const DEFAULT_TEMPLATE: &str = include_str!("system_prompt.md");

/// The external entity a conversation is about, e.g. a customer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextSelector {
    /// Identifier of the entity.
    pub id: String,
    /// Display name, also used to derive the grounding resource.
    pub name: String,
}

impl ContextSelector {
    /// Creates a selector.
    #[inline]
    pub fn new<S1: Into<String>, S2: Into<String>>(id: S1, name: S2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A system prompt template with a `{{CONTEXT}}` placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemPrompt {
    template: String,
}

impl SystemPrompt {
    /// Creates a prompt from `template`.
    ///
    /// A template without the placeholder gets the context appended.
    pub fn new<S: Into<String>>(template: S) -> Self {
        let mut template = template.into();
        if !template.contains(PLACEHOLDER) {
            if !template.is_empty() && !template.ends_with('\n') {
                template.push('\n');
            }
            template.push_str(PLACEHOLDER);
        }
        Self { template }
    }

    /// Renders the prompt for the selected context.
    pub fn render(&self, context: Option<&ContextSelector>) -> String {
        let context = match context {
            Some(context) => format!(
                "The current client is {}. The current client id is {}.",
                context.name, context.id
            ),
            None => "No client is selected, so no client id is available."
                .to_owned(),
        };
        self.template.replace(PLACEHOLDER, &context).trim().to_owned()
    }
}

impl Default for SystemPrompt {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_context() {
        let prompt = SystemPrompt::default();
        let rendered = prompt.render(Some(&ContextSelector::new("3", "BMW")));
        assert!(rendered.ends_with("The current client is BMW. The current client id is 3."));
        assert!(!rendered.contains(PLACEHOLDER));

        let rendered = prompt.render(None);
        assert!(rendered.contains("No client is selected"));
    }

    #[test]
    fn test_template_without_placeholder() {
        let prompt = SystemPrompt::new("Be brief.");
        assert_eq!(
            prompt.render(Some(&ContextSelector::new("1", "Ford"))),
            "Be brief.\nThe current client is Ford. The current client id is 1."
        );
    }
}
