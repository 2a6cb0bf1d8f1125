/// Default Neo4j REST batch endpoint
pub const DEFAULT_BATCH_URL: &str = "http://localhost:7474/db/data/batch";

/// Unique-node index that keys page nodes by title
pub const DEFAULT_NODE_INDEX: &str = "pages";

/// Index key (and node property) holding the canonical title
pub const TITLE_KEY: &str = "title";

/// Relationship type created for every wiki-link
pub const LINK_LABEL: &str = "links_to";

pub const HTTP_TIMEOUT_SECS: u64 = 60;

pub const USER_AGENT: &str = concat!("wikigraph/", env!("CARGO_PKG_VERSION"));

/// Read buffer for the dump stream
pub const READ_BUFFER_BYTES: usize = 128 * 1024;

/// Progress update interval (tick every N pages)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Checkpoint interval in pages processed
pub const CHECKPOINT_INTERVAL: u32 = 10_000;

pub const CHECKPOINT_VERSION: u32 = 1;
