//! Pipeline assembly and the indexing / query workflows.
//!
//! Two graphs cover the whole system: the indexing pipeline (embed a
//! document batch, write it to the store) and the query pipeline (embed
//! the question, retrieve neighbors, render the prompt, generate). Both
//! are built once and shared read-only across concurrent requests.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::document::Document;
use crate::embedder::{DocumentEmbedder, TextEmbedder};
use crate::embedding::EmbeddingClient;
use crate::error::{PipelineError, Result};
use crate::generator::{CompletionClient, Generator};
use crate::pipeline::{Pipeline, RunInputs, SocketValues, Value};
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;
use crate::store::{DedupPolicy, DistanceMetric, VectorStore};
use crate::writer::DocumentWriter;

/// Build the indexing pipeline: `embedder` → `writer`.
pub fn build_indexing_pipeline(
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    policy: DedupPolicy,
) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline.add_component("embedder", Box::new(DocumentEmbedder::new(embedder)))?;
    pipeline.add_component("writer", Box::new(DocumentWriter::new(store, policy)))?;
    pipeline.connect("embedder.documents", "writer.documents")?;
    Ok(pipeline)
}

/// Build the query pipeline:
/// `query_embedder` → `retriever` → `prompt_builder` → `generator`.
pub fn build_query_pipeline(
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    completer: Arc<dyn CompletionClient>,
    top_k: usize,
    metric: DistanceMetric,
    template: &str,
) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline.add_component("query_embedder", Box::new(TextEmbedder::new(embedder)))?;
    pipeline.add_component("retriever", Box::new(Retriever::new(store, top_k, metric)))?;
    pipeline.add_component("prompt_builder", Box::new(PromptBuilder::new(template)))?;
    pipeline.add_component("generator", Box::new(Generator::new(completer)))?;

    pipeline.connect("query_embedder.embedding", "retriever.query_embedding")?;
    pipeline.connect("retriever", "prompt_builder.documents")?;
    pipeline.connect("prompt_builder.prompt", "generator.prompt")?;
    Ok(pipeline)
}

/// The assembled RAG core: one store handle, two pipelines.
pub struct Rag {
    store: Arc<VectorStore>,
    indexing: Pipeline,
    query: Pipeline,
}

impl Rag {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        completer: Arc<dyn CompletionClient>,
        config: &Config,
    ) -> Result<Self> {
        let indexing = build_indexing_pipeline(
            store.clone(),
            embedder.clone(),
            config.store.write_policy,
        )?;
        let query = build_query_pipeline(
            store.clone(),
            embedder,
            completer,
            config.retrieval.top_k,
            config.retrieval.metric,
            &config.prompt.template,
        )?;

        Ok(Self {
            store,
            indexing,
            query,
        })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn indexing_pipeline(&self) -> &Pipeline {
        &self.indexing
    }

    pub fn query_pipeline(&self) -> &Pipeline {
        &self.query
    }

    /// Embed and write a batch of documents; returns how many rows landed.
    pub async fn index_documents(&self, docs: Vec<Document>) -> Result<usize> {
        index_with(&self.indexing, docs).await
    }

    /// Answer a question through the query pipeline.
    pub async fn answer(&self, question: &str, top_k: Option<usize>) -> Result<String> {
        let mut inputs = RunInputs::new();

        let mut embedder_inputs = SocketValues::new();
        embedder_inputs.insert("text".into(), Value::Text(question.to_string()));
        inputs.insert("query_embedder".into(), embedder_inputs);

        let mut builder_inputs = SocketValues::new();
        builder_inputs.insert("query".into(), Value::Text(question.to_string()));
        inputs.insert("prompt_builder".into(), builder_inputs);

        if let Some(top_k) = top_k {
            let mut retriever_inputs = SocketValues::new();
            retriever_inputs.insert("top_k".into(), Value::Count(top_k));
            inputs.insert("retriever".into(), retriever_inputs);
        }

        let results = self.query.run(inputs).await?;
        match results.get("generator").and_then(|out| out.get("reply")) {
            Some(Value::Text(reply)) => Ok(reply.clone()),
            _ => Err(PipelineError::MissingOutput {
                component: "generator".into(),
                socket: "reply".into(),
            }
            .into()),
        }
    }

    /// Index the starter corpus, but only into an empty store.
    ///
    /// The count check keeps startup idempotent; returns how many
    /// documents were written (0 when the store already has content).
    pub async fn seed_if_empty(&self) -> Result<usize> {
        if self.store.count_documents().await? > 0 {
            return Ok(0);
        }
        info!("seeding empty store with starter corpus");
        self.index_documents(seed_corpus()).await
    }
}

/// Run an indexing pipeline over a document batch.
///
/// Useful when the caller needs a one-off policy different from the
/// configured one; [`Rag::index_documents`] is the common path.
pub async fn index_with(pipeline: &Pipeline, docs: Vec<Document>) -> Result<usize> {
    let mut sockets = SocketValues::new();
    sockets.insert("documents".into(), Value::Documents(docs));
    let mut inputs = RunInputs::new();
    inputs.insert("embedder".into(), sockets);

    let results = pipeline.run(inputs).await?;
    match results.get("writer").and_then(|out| out.get("written")) {
        Some(Value::Count(written)) => Ok(*written),
        _ => Err(PipelineError::MissingOutput {
            component: "writer".into(),
            socket: "written".into(),
        }
        .into()),
    }
}

/// Built-in bowling knowledge used to bootstrap fresh deployments.
pub fn seed_corpus() -> Vec<Document> {
    let entries = [
        (
            "bowling-frames",
            "A game of bowling consists of ten frames. In each frame the \
             player has up to two rolls to knock down all 10 pins.",
            "basics",
        ),
        (
            "bowling-strike",
            "A strike means knocking down all 10 pins on the first roll of \
             a frame. It scores 10 plus the pins knocked down on the next \
             two rolls.",
            "scoring",
        ),
        (
            "bowling-spare",
            "A spare means clearing the remaining pins on the second roll \
             of a frame. It scores 10 plus the pins knocked down on the \
             next roll.",
            "scoring",
        ),
        (
            "bowling-open-frame",
            "An open frame is a frame where pins are left standing after \
             both rolls. It scores only the pins actually knocked down.",
            "scoring",
        ),
        (
            "bowling-tenth-frame",
            "The tenth frame grants bonus rolls: a strike earns two extra \
             rolls and a spare earns one, so up to three rolls are possible.",
            "rules",
        ),
        (
            "bowling-perfect-game",
            "A perfect game is twelve strikes in a row and scores 300, the \
             maximum possible in ten-pin bowling.",
            "trivia",
        ),
    ];

    entries
        .into_iter()
        .map(|(id, content, topic)| {
            Document::new(id, content)
                .with_metadata("source", "seed")
                .with_metadata("topic", topic)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_seed_corpus_ids_unique_and_content_present() {
        let corpus = seed_corpus();
        let ids: BTreeSet<_> = corpus.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), corpus.len());
        assert!(corpus.iter().all(|d| !d.content.is_empty()));
        assert!(corpus.iter().all(|d| d.metadata["source"] == "seed"));
    }
}
