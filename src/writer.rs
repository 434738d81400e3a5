//! Store-writing pipeline component.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::pipeline::{take_documents, Component, SocketSpec, SocketValues, Value, ValueKind};
use crate::store::{DedupPolicy, VectorStore};

/// Writes embedded documents to the store under a fixed dedup policy.
///
/// The only component with side effects: its writes persist across runs.
/// The batch is one store transaction, so a cancelled or failed run never
/// leaves a partial write behind.
pub struct DocumentWriter {
    store: Arc<VectorStore>,
    policy: DedupPolicy,
}

impl DocumentWriter {
    pub fn new(store: Arc<VectorStore>, policy: DedupPolicy) -> Self {
        Self { store, policy }
    }
}

const DOCUMENTS_IN: &[SocketSpec] = &[SocketSpec::required("documents", ValueKind::Documents)];
const WRITTEN_OUT: &[SocketSpec] = &[SocketSpec::required("written", ValueKind::Count)];

#[async_trait]
impl Component for DocumentWriter {
    fn input_sockets(&self) -> &[SocketSpec] {
        DOCUMENTS_IN
    }

    fn output_sockets(&self) -> &[SocketSpec] {
        WRITTEN_OUT
    }

    async fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let docs = take_documents(&mut inputs, "documents")?;
        let written = self.store.write_documents(&docs, self.policy).await?;
        info!("indexed {} of {} documents", written, docs.len());

        let mut out = SocketValues::new();
        out.insert("written".into(), Value::Count(written));
        Ok(out)
    }
}
