//! Wikigraph: stream a wiki XML dump into a graph store of pages and links
//!
//! Every page becomes a node keyed by its title and every valid outgoing
//! wiki-link becomes a `links_to` relationship. Pages are handled strictly one
//! at a time:
//!
//! 1. **Scan** -- [`parser::PageScanner`] cuts the dump into one fragment per
//!    top-level `<page>` element, holding at most one page in memory
//! 2. **Parse** -- [`page::parse_page`] reads the first `<title>` and `<text>`
//! 3. **Extract** -- [`content::extract_links`] finds single-level `[[...]]` markup
//! 4. **Canonicalize** -- [`canonical::page_links`] strips aliases and anchors,
//!    drops non-Main namespaces, normalizes titles and deduplicates per page
//! 5. **Load** -- [`import::GraphLoader`] upserts nodes through the store's
//!    unique index and creates relationships, one batch request per page
//!
//! Node deduplication is delegated to the store (get-or-create on a unique
//! index); relationships are not deduplicated across pages.
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming page scanner with BZ2 support
//! - [`page`] -- Page fragment parsing
//! - [`content`] -- Wiki-link extraction
//! - [`canonical`] -- Link canonicalization and per-page deduplication
//! - [`store`] -- Graph store boundary: REST batch client and in-memory store
//! - [`import`] -- Per-page node/relationship loading
//! - [`extract`] -- The sequential pipeline driver
//! - [`checkpoint`] -- Resumable runs
//! - [`stats`] -- Run counters
//! - [`config`] -- Constants and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Load a compressed dump into a local Neo4j
//! wikigraph enwiki-latest-pages-articles.xml.bz2 -v
//!
//! # Count what would be loaded without touching the store
//! bzcat dump.xml.bz2 | wikigraph --dry-run
//! ```

pub mod canonical;
pub mod checkpoint;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod import;
pub mod models;
pub mod page;
pub mod parser;
pub mod stats;
pub mod store;
