//! Pipeline components that attach embeddings to text.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::EmbeddingClient;
use crate::error::{EmbedError, Result};
use crate::pipeline::{
    take_documents, take_text, Component, SocketSpec, SocketValues, Value, ValueKind,
};

/// Batch-embeds documents, preserving order and ids.
///
/// Any batch failure fails the whole run; documents are never written with
/// a partial set of embeddings.
pub struct DocumentEmbedder {
    client: Arc<dyn EmbeddingClient>,
}

impl DocumentEmbedder {
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self { client }
    }
}

const DOCUMENTS_IN: &[SocketSpec] = &[SocketSpec::required("documents", ValueKind::Documents)];
const DOCUMENTS_OUT: &[SocketSpec] = &[SocketSpec::required("documents", ValueKind::Documents)];

#[async_trait]
impl Component for DocumentEmbedder {
    fn input_sockets(&self) -> &[SocketSpec] {
        DOCUMENTS_IN
    }

    fn output_sockets(&self) -> &[SocketSpec] {
        DOCUMENTS_OUT
    }

    async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let mut docs = take_documents(&mut inputs, "documents")?;

        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let vectors = self.client.embed_batch(&texts).await?;
        if vectors.len() != docs.len() {
            return Err(EmbedError::CountMismatch {
                expected: docs.len(),
                actual: vectors.len(),
            }
            .into());
        }

        for (doc, vector) in docs.iter_mut().zip(vectors) {
            doc.embedding = Some(vector);
        }

        let mut out = SocketValues::new();
        out.insert("documents".into(), Value::Documents(docs));
        Ok(out)
    }
}

/// Embeds a single query string.
pub struct TextEmbedder {
    client: Arc<dyn EmbeddingClient>,
}

impl TextEmbedder {
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self { client }
    }
}

const TEXT_IN: &[SocketSpec] = &[SocketSpec::required("text", ValueKind::Text)];
const EMBEDDING_OUT: &[SocketSpec] = &[SocketSpec::required("embedding", ValueKind::Embedding)];

#[async_trait]
impl Component for TextEmbedder {
    fn input_sockets(&self) -> &[SocketSpec] {
        TEXT_IN
    }

    fn output_sockets(&self) -> &[SocketSpec] {
        EMBEDDING_OUT
    }

    async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let text = take_text(&mut inputs, "text")?;
        let vectors = self.client.embed_batch(std::slice::from_ref(&text)).await?;
        let embedding = vectors.into_iter().next().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })?;

        let mut out = SocketValues::new();
        out.insert("embedding".into(), Value::Embedding(embedding));
        Ok(out)
    }
}
