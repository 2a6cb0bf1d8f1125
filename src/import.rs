use crate::config::{DEFAULT_NODE_INDEX, LINK_LABEL, TITLE_KEY};
use crate::error::LoadError;
use crate::models::{NodeId, PageLinks};
use crate::store::{Batch, GraphStore, NodeRef, OpResult};
use tracing::debug;

/// Smallest batch that still fits the page node plus one link (node + relationship).
const MIN_BATCH_OPS: usize = 3;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub index: String,
    pub key: String,
    pub label: String,
    /// Split pages whose batch would exceed this many operations. `None`
    /// sends every page as a single batch.
    pub max_batch_ops: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            index: DEFAULT_NODE_INDEX.to_string(),
            key: TITLE_KEY.to_string(),
            label: LINK_LABEL.to_string(),
            max_batch_ops: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub page: NodeId,
    pub nodes_upserted: u64,
    pub edges_created: u64,
    pub batches: u64,
}

/// Writes pages and their links to a graph store.
///
/// Node identity is left to the store's unique-node upsert; edges are created
/// as asked, so the same pair linked from two pages yields two edges.
pub struct GraphLoader<S> {
    store: S,
    config: LoaderConfig,
}

impl<S: GraphStore> GraphLoader<S> {
    pub fn new(store: S, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn upsert_node(&mut self, title: &str) -> Result<NodeId, LoadError> {
        let mut batch = Batch::new();
        let op = batch.push_node(&self.config.index, &self.config.key, title);
        let results = self.run(&batch)?;
        Ok(NodeId::new(results[op].self_ref.clone()))
    }

    /// Returns the relationship's self reference.
    pub fn create_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<String, LoadError> {
        let mut batch = Batch::new();
        let op = batch.push_relationship(
            &self.config.label,
            NodeRef::Stored(from.clone()),
            NodeRef::Stored(to.clone()),
        );
        let mut results = self.run(&batch)?;
        Ok(results.swap_remove(op).self_ref)
    }

    /// Upserts the page node, then for every link the target node followed by
    /// the relationship, in link order. Everything goes out as one batch unless
    /// `max_batch_ops` is set and exceeded; later batches then refer to the page
    /// node by the identity returned for the first one.
    pub fn save_page(&mut self, page: &PageLinks) -> Result<PageSummary, LoadError> {
        let capacity = self
            .config
            .max_batch_ops
            .map_or(usize::MAX, |ops| ops.max(MIN_BATCH_OPS));
        let mut batches = 0u64;

        let mut batch = Batch::new();
        let mut page_ref = NodeRef::Pending(batch.push_node(
            &self.config.index,
            &self.config.key,
            &page.title,
        ));

        for link in &page.links {
            if batch.len().saturating_add(2) > capacity {
                let results = self.run(&batch)?;
                batches += 1;
                page_ref = NodeRef::Stored(resolve(&page_ref, &results));
                batch = Batch::new();
            }
            let target = batch.push_node(&self.config.index, &self.config.key, &link.target);
            batch.push_relationship(&self.config.label, page_ref.clone(), NodeRef::Pending(target));
        }

        // Never empty: it holds the page node or the link that forced the last flush.
        let results = self.run(&batch)?;
        batches += 1;

        let summary = PageSummary {
            page: resolve(&page_ref, &results),
            nodes_upserted: 1 + page.links.len() as u64,
            edges_created: page.links.len() as u64,
            batches,
        };
        debug!(
            title = %page.title,
            links = page.links.len(),
            batches = summary.batches,
            "Saved page"
        );
        Ok(summary)
    }

    /// Executes a batch and checks that every operation got a result.
    fn run(&mut self, batch: &Batch) -> Result<Vec<OpResult>, LoadError> {
        let results = self.store.execute(batch)?;
        if results.len() != batch.len() {
            return Err(LoadError::ResultCountMismatch {
                expected: batch.len(),
                got: results.len(),
            });
        }
        Ok(results)
    }
}

fn resolve(node: &NodeRef, results: &[OpResult]) -> NodeId {
    match node {
        NodeRef::Pending(i) => NodeId::new(results[*i].self_ref.clone()),
        NodeRef::Stored(id) => id.clone(),
    }
}
