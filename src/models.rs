use std::fmt;

/// Serialized markup of one top-level `<page>` element, descendants included verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFragment(Vec<u8>);

impl PageFragment {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRecord {
    pub title: String,
    pub text: String,
}

/// A `[[...]]` occurrence exactly as written, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLink<'a> {
    pub source: &'a str,
    pub markup: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    pub source: String,
    pub target: String,
}

/// The valid, per-page deduplicated links of one page plus what was dropped on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub title: String,
    pub links: Vec<WikiLink>,
    pub raw: u64,
    pub rejected: u64,
    pub duplicates: u64,
}

/// Store-assigned node identity (the node's self reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(self_ref: impl Into<String>) -> Self {
        Self(self_ref.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
