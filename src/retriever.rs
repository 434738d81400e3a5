//! Nearest-neighbor retrieval component.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::pipeline::{
    take_count_opt, take_embedding, Component, SocketSpec, SocketValues, Value, ValueKind,
};
use crate::store::{DistanceMetric, VectorStore};

/// Thin adapter over [`VectorStore::similarity_search`].
///
/// Scores are logged but dropped from the public result; downstream
/// components only see the ordered documents.
pub struct Retriever {
    store: Arc<VectorStore>,
    top_k: usize,
    metric: DistanceMetric,
}

impl Retriever {
    pub fn new(store: Arc<VectorStore>, top_k: usize, metric: DistanceMetric) -> Self {
        Self {
            store,
            top_k,
            metric,
        }
    }
}

const INPUTS: &[SocketSpec] = &[
    SocketSpec::required("query_embedding", ValueKind::Embedding),
    SocketSpec::optional("top_k", ValueKind::Count),
];
const DOCUMENTS_OUT: &[SocketSpec] = &[SocketSpec::required("documents", ValueKind::Documents)];

#[async_trait]
impl Component for Retriever {
    fn input_sockets(&self) -> &[SocketSpec] {
        INPUTS
    }

    fn output_sockets(&self) -> &[SocketSpec] {
        DOCUMENTS_OUT
    }

    async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let embedding = take_embedding(&mut inputs, "query_embedding")?;
        let top_k = take_count_opt(&mut inputs, "top_k")?.unwrap_or(self.top_k);

        let hits = self
            .store
            .similarity_search(&embedding, top_k, self.metric)
            .await?;

        for (doc, score) in &hits {
            debug!(id = %doc.id, score = *score, "retrieved document");
        }

        let documents = hits.into_iter().map(|(doc, _)| doc).collect();
        let mut out = SocketValues::new();
        out.insert("documents".into(), Value::Documents(documents));
        Ok(out)
    }
}
