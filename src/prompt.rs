//! Prompt template rendering.
//!
//! Pure string substitution: no network, no storage. Documents are
//! rendered in the order the retriever returned them.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Result;
use crate::pipeline::{
    take_documents, take_text, Component, SocketSpec, SocketValues, Value, ValueKind,
};

/// Default template, aimed at the bowling deployment this core ships with.
pub const DEFAULT_TEMPLATE: &str = "\
You are a professional sports commentator announcing a bowling match.
Use the retrieved documents (player history, past games, scores) to add
colorful and exciting context.

Speak with enthusiasm, energy, and drama, as if you're on live TV.

Question (viewer request): {{query}}
Documents (stats & background): {{documents}}

Now give a broadcast-style commentary:
";

/// Renders `{{query}}` and `{{documents}}` into a fixed template.
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

/// Render documents as a numbered list, content verbatim.
fn render_documents(documents: &[Document]) -> String {
    let mut block = String::new();
    for (i, doc) in documents.iter().enumerate() {
        if i > 0 {
            block.push('\n');
        }
        block.push_str(&format!("{}. {}", i + 1, doc.content));
    }
    block
}

/// Substitute `query` and `documents` into `template`.
pub fn render(template: &str, query: &str, documents: &[Document]) -> String {
    template
        .replace("{{query}}", query)
        .replace("{{documents}}", &render_documents(documents))
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::required("query", ValueKind::Text),
    SocketSpec::required("documents", ValueKind::Documents),
];
const PROMPT_OUT: &[SocketSpec] = &[SocketSpec::required("prompt", ValueKind::Text)];

#[async_trait]
impl Component for PromptBuilder {
    fn input_sockets(&self) -> &[SocketSpec] {
        INPUTS
    }

    fn output_sockets(&self) -> &[SocketSpec] {
        PROMPT_OUT
    }

    async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let query = take_text(&mut inputs, "query")?;
        let documents = take_documents(&mut inputs, "documents")?;

        let prompt = render(&self.template, &query, &documents);
        let mut out = SocketValues::new();
        out.insert("prompt".into(), Value::Text(prompt));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_both_placeholders() {
        let docs = vec![
            Document::new("d1", "A strike means knocking down all 10 pins."),
            Document::new("d2", "A spare means clearing the remaining pins on the second roll."),
        ];

        let prompt = render(DEFAULT_TEMPLATE, "What is a spare?", &docs);

        assert!(prompt.contains("What is a spare?"));
        assert!(prompt.contains("1. A strike means knocking down all 10 pins."));
        assert!(prompt.contains("2. A spare means clearing the remaining pins on the second roll."));
        assert!(!prompt.contains("{{query}}"));
        assert!(!prompt.contains("{{documents}}"));
    }

    #[test]
    fn test_render_preserves_document_order() {
        let docs = vec![Document::new("z", "last by id"), Document::new("a", "first by id")];
        let prompt = render("{{query}}|{{documents}}", "q", &docs);
        let last = prompt.find("last by id").unwrap();
        let first = prompt.find("first by id").unwrap();
        assert!(last < first, "documents must render in supplied order");
    }

    #[test]
    fn test_render_is_deterministic() {
        let docs = vec![Document::new("d1", "content")];
        let a = render(DEFAULT_TEMPLATE, "q", &docs);
        let b = render(DEFAULT_TEMPLATE, "q", &docs);
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_empty_documents() {
        let prompt = render("docs: {{documents}} q: {{query}}", "hi", &[]);
        assert_eq!(prompt, "docs:  q: hi");
    }
}
