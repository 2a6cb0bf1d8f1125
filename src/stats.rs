use crate::checkpoint::CheckpointStats;
use crate::import::PageSummary;
use crate::models::PageLinks;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected while loading a dump
#[derive(Default)]
pub struct RunStats {
    pub pages_seen: AtomicU64,
    pub pages_loaded: AtomicU64,
    pub pages_skipped: AtomicU64,
    pub pages_failed: AtomicU64,
    pub raw_links: AtomicU64,
    pub valid_links: AtomicU64,
    pub rejected_links: AtomicU64,
    pub duplicate_links: AtomicU64,
    pub nodes_upserted: AtomicU64,
    pub edges_created: AtomicU64,
    pub batches_sent: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_seen(&self) {
        self.pages_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.pages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_links(&self, links: &PageLinks) {
        self.raw_links.fetch_add(links.raw, Ordering::Relaxed);
        self.valid_links
            .fetch_add(links.links.len() as u64, Ordering::Relaxed);
        self.rejected_links
            .fetch_add(links.rejected, Ordering::Relaxed);
        self.duplicate_links
            .fetch_add(links.duplicates, Ordering::Relaxed);
    }

    pub fn record_saved(&self, summary: &PageSummary) {
        self.pages_loaded.fetch_add(1, Ordering::Relaxed);
        self.nodes_upserted
            .fetch_add(summary.nodes_upserted, Ordering::Relaxed);
        self.edges_created
            .fetch_add(summary.edges_created, Ordering::Relaxed);
        self.batches_sent
            .fetch_add(summary.batches, Ordering::Relaxed);
    }

    pub fn seen(&self) -> u64 {
        self.pages_seen.load(Ordering::Relaxed)
    }

    pub fn loaded(&self) -> u64 {
        self.pages_loaded.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.pages_skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.pages_failed.load(Ordering::Relaxed)
    }

    pub fn raw(&self) -> u64 {
        self.raw_links.load(Ordering::Relaxed)
    }

    pub fn valid(&self) -> u64 {
        self.valid_links.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_links.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicate_links.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> u64 {
        self.nodes_upserted.load(Ordering::Relaxed)
    }

    pub fn edges(&self) -> u64 {
        self.edges_created.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    /// Create stats initialized from a checkpoint
    pub fn from_checkpoint(cp: &CheckpointStats) -> Self {
        Self {
            pages_seen: AtomicU64::new(cp.pages_seen),
            pages_loaded: AtomicU64::new(cp.pages_loaded),
            pages_skipped: AtomicU64::new(cp.pages_skipped),
            pages_failed: AtomicU64::new(cp.pages_failed),
            raw_links: AtomicU64::new(cp.raw_links),
            valid_links: AtomicU64::new(cp.valid_links),
            rejected_links: AtomicU64::new(cp.rejected_links),
            duplicate_links: AtomicU64::new(cp.duplicate_links),
            nodes_upserted: AtomicU64::new(cp.nodes_upserted),
            edges_created: AtomicU64::new(cp.edges_created),
            batches_sent: AtomicU64::new(cp.batches_sent),
        }
    }

    /// Convert to checkpoint stats for persistence
    pub fn to_checkpoint(&self) -> CheckpointStats {
        CheckpointStats {
            pages_seen: self.seen(),
            pages_loaded: self.loaded(),
            pages_skipped: self.skipped(),
            pages_failed: self.failed(),
            raw_links: self.raw(),
            valid_links: self.valid(),
            rejected_links: self.rejected(),
            duplicate_links: self.duplicates(),
            nodes_upserted: self.nodes(),
            edges_created: self.edges(),
            batches_sent: self.batches(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeId;

    #[test]
    fn default_values_are_zero() {
        let stats = RunStats::new();
        assert_eq!(stats.seen(), 0);
        assert_eq!(stats.loaded(), 0);
        assert_eq!(stats.edges(), 0);
        assert_eq!(stats.rejected(), 0);
    }

    #[test]
    fn record_links_accumulates() {
        let stats = RunStats::new();
        let links = PageLinks {
            title: "P".to_string(),
            links: Vec::new(),
            raw: 5,
            rejected: 2,
            duplicates: 3,
        };
        stats.record_links(&links);
        stats.record_links(&links);
        assert_eq!(stats.raw(), 10);
        assert_eq!(stats.valid(), 0);
        assert_eq!(stats.rejected(), 4);
        assert_eq!(stats.duplicates(), 6);
    }

    #[test]
    fn record_saved_accumulates() {
        let stats = RunStats::new();
        let summary = PageSummary {
            page: NodeId::new("memory://node/0"),
            nodes_upserted: 4,
            edges_created: 3,
            batches: 1,
        };
        stats.record_saved(&summary);
        assert_eq!(stats.loaded(), 1);
        assert_eq!(stats.nodes(), 4);
        assert_eq!(stats.edges(), 3);
        assert_eq!(stats.batches(), 1);
    }

    #[test]
    fn checkpoint_roundtrip() {
        let original = RunStats::new();
        original.inc_seen();
        original.inc_seen();
        original.inc_skipped();
        original.inc_failed();
        original.edges_created.fetch_add(7, Ordering::Relaxed);

        let restored = RunStats::from_checkpoint(&original.to_checkpoint());
        assert_eq!(restored.seen(), 2);
        assert_eq!(restored.skipped(), 1);
        assert_eq!(restored.failed(), 1);
        assert_eq!(restored.edges(), 7);
    }
}
