//! Typed errors for the scanning, parsing and loading stages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed markup reported by the XML reader.
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    /// The stream ended while a page element was still open.
    #[error("input ended inside page {page} (unterminated <page> element)")]
    Truncated { page: u64 },

    #[error("invalid UTF-8 in page content: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    /// Store unreachable, timeout, or any other HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("graph store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid batch JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed batch response: {0}")]
    MalformedResponse(String),

    #[error("batch of {expected} operations produced {got} results")]
    ResultCountMismatch { expected: usize, got: usize },

    /// The store refused an operation, e.g. a reference to an unknown node.
    #[error("graph store rejected batch: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to parse page {page}: {source}")]
    Parse {
        page: u64,
        #[source]
        source: ParseError,
    },

    #[error("failed to load page {title:?}: {source}")]
    Load {
        title: String,
        #[source]
        source: LoadError,
    },

    #[error("checkpoint failed: {0:#}")]
    Checkpoint(anyhow::Error),
}
