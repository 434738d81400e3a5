//! Core data model shared by the pipeline, store, and adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A unit of retrievable content.
///
/// `id` is unique within a store. `embedding` is absent until a
/// [`DocumentEmbedder`](crate::embedder::DocumentEmbedder) attaches one;
/// once written to a store it must match the store's fixed dimension.
/// Metadata values are scalars (strings, numbers, booleans) keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let doc = Document::new("d1", "A strike means knocking down all 10 pins.")
            .with_embedding(vec![1.0, 0.0])
            .with_metadata("source", "seed")
            .with_metadata("page", 3);

        assert_eq!(doc.id, "d1");
        assert_eq!(doc.embedding.as_deref(), Some(&[1.0, 0.0][..]));
        assert_eq!(doc.metadata["source"], serde_json::json!("seed"));
        assert_eq!(doc.metadata["page"], serde_json::json!(3));
    }

    #[test]
    fn test_serde_roundtrip_without_embedding() {
        let doc = Document::new("d2", "A spare clears the remaining pins.");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("embedding"));

        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
