//! Graph store boundary: the batch model, the REST batch client and an
//! in-memory store with the same unique-node semantics.

use crate::config::{HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::error::LoadError;
use crate::models::NodeId;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Where a relationship endpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// Result of an earlier operation in the same batch.
    Pending(usize),
    /// A node created by an earlier request.
    Stored(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Find-or-create a node keyed by `index`/`key`/`value`; the node gets
    /// `key = value` as its only property.
    UniqueNode {
        index: String,
        key: String,
        value: String,
    },
    Relationship {
        label: String,
        from: NodeRef,
        to: NodeRef,
    },
}

/// Ordered operations sent to the store in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unique-node upsert and returns its position for back-references.
    pub fn push_node(&mut self, index: &str, key: &str, value: &str) -> usize {
        self.ops.push(BatchOp::UniqueNode {
            index: index.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        self.ops.len() - 1
    }

    pub fn push_relationship(&mut self, label: &str, from: NodeRef, to: NodeRef) -> usize {
        debug_assert!(self.refers_backwards(&from) && self.refers_backwards(&to));
        self.ops.push(BatchOp::Relationship {
            label: label.to_string(),
            from,
            to,
        });
        self.ops.len() - 1
    }

    fn refers_backwards(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Pending(i) => *i < self.ops.len(),
            NodeRef::Stored(_) => true,
        }
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Per-operation result, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpResult {
    pub id: usize,
    pub self_ref: String,
}

pub trait GraphStore {
    /// Executes all operations of `batch` as one request and returns one
    /// result per operation, in order.
    fn execute(&mut self, batch: &Batch) -> Result<Vec<OpResult>, LoadError>;
}

impl<S: GraphStore + ?Sized> GraphStore for &mut S {
    fn execute(&mut self, batch: &Batch) -> Result<Vec<OpResult>, LoadError> {
        (**self).execute(batch)
    }
}

// ---------------------------------------------------------------------------
// REST batch endpoint
// ---------------------------------------------------------------------------

pub struct RestStoreConfig {
    pub batch_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl RestStoreConfig {
    pub fn new(batch_url: impl Into<String>) -> Self {
        Self {
            batch_url: batch_url.into(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Client for a Neo4j-style `/db/data/batch` endpoint.
pub struct RestBatchStore {
    client: Client,
    batch_url: String,
}

#[derive(Serialize, Debug)]
struct Job<'a> {
    method: &'static str,
    to: String,
    id: usize,
    body: JobBody<'a>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum JobBody<'a> {
    UniqueNode {
        key: &'a str,
        value: &'a str,
        properties: FxHashMap<&'a str, &'a str>,
    },
    Relationship {
        to: String,
        #[serde(rename = "type")]
        label: &'a str,
    },
}

#[derive(Deserialize, Debug)]
struct JobResult {
    id: Option<usize>,
    location: Option<String>,
    body: Option<JobResultBody>,
}

#[derive(Deserialize, Debug)]
struct JobResultBody {
    #[serde(rename = "self")]
    self_ref: Option<String>,
}

fn ref_uri(node: &NodeRef) -> String {
    match node {
        NodeRef::Pending(i) => format!("{{{i}}}"),
        NodeRef::Stored(id) => id.as_str().to_string(),
    }
}

fn batch_jobs(batch: &Batch) -> Vec<Job<'_>> {
    batch
        .ops()
        .iter()
        .enumerate()
        .map(|(id, op)| match op {
            BatchOp::UniqueNode { index, key, value } => Job {
                method: "POST",
                to: format!("/index/node/{index}?uniqueness=get_or_create"),
                id,
                body: JobBody::UniqueNode {
                    key: key.as_str(),
                    value: value.as_str(),
                    properties: [(key.as_str(), value.as_str())].into_iter().collect(),
                },
            },
            BatchOp::Relationship { label, from, to } => Job {
                method: "POST",
                to: format!("{}/relationships", ref_uri(from)),
                id,
                body: JobBody::Relationship {
                    to: ref_uri(to),
                    label: label.as_str(),
                },
            },
        })
        .collect()
}

/// Builds the JSON job list posted for `batch`.
pub fn encode_batch(batch: &Batch) -> Result<serde_json::Value, LoadError> {
    Ok(serde_json::to_value(batch_jobs(batch))?)
}

/// Matches response entries to operations by `id` (falling back to position)
/// and pulls out each result's self reference.
pub fn decode_results(batch: &Batch, body: &str) -> Result<Vec<OpResult>, LoadError> {
    let entries: Vec<JobResult> = serde_json::from_str(body)?;
    if entries.len() != batch.len() {
        return Err(LoadError::ResultCountMismatch {
            expected: batch.len(),
            got: entries.len(),
        });
    }

    let mut refs: Vec<Option<String>> = vec![None; batch.len()];
    for (position, entry) in entries.into_iter().enumerate() {
        let id = entry.id.unwrap_or(position);
        let slot = refs.get_mut(id).ok_or_else(|| {
            LoadError::MalformedResponse(format!("result id {id} outside batch of {}", batch.len()))
        })?;
        let self_ref = entry.body.and_then(|b| b.self_ref).or(entry.location);
        *slot = Some(self_ref.ok_or_else(|| {
            LoadError::MalformedResponse(format!("result {id} has no self reference"))
        })?);
    }

    refs.into_iter()
        .enumerate()
        .map(|(id, self_ref)| {
            self_ref
                .map(|self_ref| OpResult { id, self_ref })
                .ok_or_else(|| LoadError::MalformedResponse(format!("no result for operation {id}")))
        })
        .collect()
}

impl RestBatchStore {
    pub fn new(config: &RestStoreConfig) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            batch_url: config.batch_url.clone(),
        })
    }

    pub fn batch_url(&self) -> &str {
        &self.batch_url
    }
}

impl GraphStore for RestBatchStore {
    fn execute(&mut self, batch: &Batch) -> Result<Vec<OpResult>, LoadError> {
        let jobs = encode_batch(batch)?;
        trace!(ops = batch.len(), url = %self.batch_url, "Posting batch");

        let response = self
            .client
            .post(&self.batch_url)
            .header(ACCEPT, "application/json")
            .json(&jobs)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(LoadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_results(batch, &body)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: String,
}

/// In-process graph with get-or-create node semantics. Each batch is
/// validated before any of it is applied, so a rejected batch leaves no trace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: FxHashMap<(String, String, String), NodeId>,
    values: FxHashMap<NodeId, String>,
    edges: Vec<StoredEdge>,
    batches: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.values.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn node_id(&self, index: &str, key: &str, value: &str) -> Option<&NodeId> {
        self.index
            .get(&(index.to_string(), key.to_string(), value.to_string()))
    }

    /// The indexed value a node was created with.
    pub fn value_of(&self, id: &NodeId) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    pub fn edges(&self) -> &[StoredEdge] {
        &self.edges
    }

    /// Edges as `(from value, to value)` pairs, in creation order.
    pub fn edge_values(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .map(|e| {
                (
                    self.value_of(&e.from).unwrap_or_default().to_string(),
                    self.value_of(&e.to).unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    fn validate(&self, batch: &Batch) -> Result<(), LoadError> {
        for (i, op) in batch.ops().iter().enumerate() {
            if let BatchOp::Relationship { from, to, .. } = op {
                for node in [from, to] {
                    match node {
                        NodeRef::Pending(n) if *n >= i => {
                            return Err(LoadError::Rejected(format!(
                                "operation {i} refers forward to {n}"
                            )));
                        }
                        NodeRef::Pending(n) => {
                            if !matches!(batch.ops()[*n], BatchOp::UniqueNode { .. }) {
                                return Err(LoadError::Rejected(format!(
                                    "operation {i} refers to non-node operation {n}"
                                )));
                            }
                        }
                        NodeRef::Stored(id) => {
                            if !self.values.contains_key(id) {
                                return Err(LoadError::Rejected(format!("unknown node {id}")));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn upsert(&mut self, index: &str, key: &str, value: &str) -> NodeId {
        let next = self.values.len();
        let id = self
            .index
            .entry((index.to_string(), key.to_string(), value.to_string()))
            .or_insert_with(|| NodeId::new(format!("memory://node/{next}")))
            .clone();
        self.values.entry(id.clone()).or_insert_with(|| value.to_string());
        id
    }
}

impl GraphStore for MemoryStore {
    fn execute(&mut self, batch: &Batch) -> Result<Vec<OpResult>, LoadError> {
        self.validate(batch)?;
        self.batches += 1;

        let mut results: Vec<OpResult> = Vec::with_capacity(batch.len());
        for (id, op) in batch.ops().iter().enumerate() {
            let self_ref = match op {
                BatchOp::UniqueNode { index, key, value } => {
                    self.upsert(index, key, value).as_str().to_string()
                }
                BatchOp::Relationship { label, from, to } => {
                    let resolve = |node: &NodeRef| match node {
                        NodeRef::Pending(n) => NodeId::new(results[*n].self_ref.clone()),
                        NodeRef::Stored(id) => id.clone(),
                    };
                    let self_ref = format!("memory://relationship/{}", self.edges.len());
                    self.edges.push(StoredEdge {
                        from: resolve(from),
                        to: resolve(to),
                        label: label.clone(),
                    });
                    self_ref
                }
            };
            results.push(OpResult { id, self_ref });
        }

        debug!(ops = batch.len(), nodes = self.node_count(), edges = self.edge_count(), "Applied batch");
        Ok(results)
    }
}
