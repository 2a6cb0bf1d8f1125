use crate::config::CHECKPOINT_VERSION;
use crate::stats::RunStats;
use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const CHECKPOINT_FILE: &str = "wikigraph.checkpoint";

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct CheckpointStats {
    pub pages_seen: u64,
    pub pages_loaded: u64,
    pub pages_skipped: u64,
    pub pages_failed: u64,
    pub raw_links: u64,
    pub valid_links: u64,
    pub rejected_links: u64,
    pub duplicate_links: u64,
    pub nodes_upserted: u64,
    pub edges_created: u64,
    pub batches_sent: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Checkpoint {
    pub version: u32,
    pub input_path: String,
    pub input_mtime: u64,
    pub batch_url: String,
    /// Leading pages of the dump that are fully handled.
    pub pages_completed: u64,
    pub stats: CheckpointStats,
}

impl Checkpoint {
    /// Describes why this checkpoint cannot resume a run over `input_path`
    /// into `batch_url`, or `None` when it can.
    fn mismatch(&self, input_path: &str, input_mtime: u64, batch_url: &str) -> Option<String> {
        if self.version != CHECKPOINT_VERSION {
            Some(format!(
                "written by format {} (expected {CHECKPOINT_VERSION})",
                self.version
            ))
        } else if self.input_path != input_path {
            Some(format!("belongs to dump {}", self.input_path))
        } else if self.input_mtime != input_mtime {
            Some("dump was modified after the checkpoint was written".to_string())
        } else if self.batch_url != batch_url {
            Some(format!("belongs to graph store {}", self.batch_url))
        } else {
            None
        }
    }
}

pub fn checkpoint_path(checkpoint_dir: &str) -> PathBuf {
    Path::new(checkpoint_dir).join(CHECKPOINT_FILE)
}

fn modified_secs(input_path: &str) -> Result<u64> {
    let modified = fs::metadata(input_path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {input_path}"))?;
    Ok(modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("Modification time precedes the epoch")?
        .as_secs())
}

/// Reads the checkpoint at `path`; an unreadable file counts as absent.
fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read checkpoint {}", path.display()))
        }
    };

    let decoded = bincode::options()
        .with_limit(bytes.len() as u64)
        .deserialize::<Checkpoint>(&bytes);
    match decoded {
        Ok(checkpoint) => Ok(Some(checkpoint)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable checkpoint");
            Ok(None)
        }
    }
}

/// Returns the stored checkpoint if it was written for this dump file, in
/// its current state, against the same graph store.
pub fn load_if_valid(
    input_path: &str,
    checkpoint_dir: &str,
    batch_url: &str,
) -> Result<Option<Checkpoint>> {
    let Some(checkpoint) = read_checkpoint(&checkpoint_path(checkpoint_dir))? else {
        return Ok(None);
    };

    let input_mtime = modified_secs(input_path)?;
    if let Some(reason) = checkpoint.mismatch(input_path, input_mtime, batch_url) {
        info!(%reason, "Not resuming from checkpoint");
        return Ok(None);
    }

    info!(
        pages_completed = checkpoint.pages_completed,
        pages_loaded = checkpoint.stats.pages_loaded,
        "Found usable checkpoint"
    );
    Ok(Some(checkpoint))
}

pub fn clear(checkpoint_dir: &str) -> Result<()> {
    let path = checkpoint_path(checkpoint_dir);
    match fs::remove_file(&path) {
        Ok(()) => {
            info!("Checkpoint cleared");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove checkpoint {}", path.display())),
    }
}

/// Periodically records how far a run over one dump file has come.
pub struct CheckpointManager {
    checkpoint_dir: String,
    input_path: String,
    input_mtime: u64,
    batch_url: String,
    interval: u32,
    pages_since_save: u32,
}

impl CheckpointManager {
    pub fn new(
        input_path: &str,
        checkpoint_dir: &str,
        batch_url: &str,
        interval: u32,
    ) -> Result<Self> {
        Ok(Self {
            checkpoint_dir: checkpoint_dir.to_string(),
            input_path: input_path.to_string(),
            input_mtime: modified_secs(input_path)?,
            batch_url: batch_url.to_string(),
            interval: interval.max(1),
            pages_since_save: 0,
        })
    }

    /// Counts one finished page and saves every `interval` pages.
    pub fn maybe_save(&mut self, pages_completed: u64, stats: &RunStats) -> Result<bool> {
        self.pages_since_save += 1;
        if self.pages_since_save < self.interval {
            return Ok(false);
        }
        self.save(pages_completed, stats)?;
        self.pages_since_save = 0;
        Ok(true)
    }

    /// Writes the checkpoint to a sibling temp file, then renames it over the old one.
    pub fn save(&self, pages_completed: u64, stats: &RunStats) -> Result<()> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            input_path: self.input_path.clone(),
            input_mtime: self.input_mtime,
            batch_url: self.batch_url.clone(),
            pages_completed,
            stats: stats.to_checkpoint(),
        };

        let target = checkpoint_path(&self.checkpoint_dir);
        fs::create_dir_all(&self.checkpoint_dir)
            .with_context(|| format!("Failed to create {}", self.checkpoint_dir))?;

        let staging = target.with_extension("checkpoint.tmp");
        let file = File::create(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        bincode::options()
            .serialize_into(BufWriter::new(file), &checkpoint)
            .context("Failed to encode checkpoint")?;
        fs::rename(&staging, &target)
            .with_context(|| format!("Failed to move checkpoint into {}", target.display()))?;

        debug!(pages_completed, "Checkpoint saved");
        Ok(())
    }

    /// Settles the checkpoint once the pipeline returns successfully.
    ///
    /// A run that read the whole dump without failed pages has nothing left
    /// to resume, so the checkpoint is removed. Otherwise the final position
    /// is written and kept. Returns whether a checkpoint remains.
    pub fn finish_run(
        &self,
        pages_completed: u64,
        stats: &RunStats,
        reached_end: bool,
    ) -> Result<bool> {
        if reached_end && stats.failed() == 0 {
            self.clear()?;
            return Ok(false);
        }
        self.save(pages_completed, stats)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        clear(&self.checkpoint_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const STORE: &str = "http://localhost:7474/db/data/batch";

    /// A dump file and a state directory side by side in one temp dir.
    struct Workspace {
        dir: TempDir,
        dump: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let dump = dir.path().join("enwiki.xml");
            fs::write(&dump, "<mediawiki><page><title>A</title></page></mediawiki>").unwrap();
            Self { dir, dump }
        }

        fn dump(&self) -> &str {
            self.dump.to_str().unwrap()
        }

        fn state(&self) -> &str {
            self.dir.path().to_str().unwrap()
        }

        fn manager(&self, interval: u32) -> CheckpointManager {
            CheckpointManager::new(self.dump(), self.state(), STORE, interval).unwrap()
        }

        fn load(&self) -> Option<Checkpoint> {
            load_if_valid(self.dump(), self.state(), STORE).unwrap()
        }
    }

    #[test]
    fn checkpoint_lives_in_state_dir() {
        assert_eq!(
            checkpoint_path("/var/lib/wikigraph"),
            PathBuf::from("/var/lib/wikigraph/wikigraph.checkpoint")
        );
    }

    #[test]
    fn nothing_to_resume_in_fresh_dir() {
        let ws = Workspace::new();
        assert!(ws.load().is_none());
    }

    #[test]
    fn saved_position_and_counters_come_back() {
        let ws = Workspace::new();
        let stats = RunStats::new();
        for _ in 0..3 {
            stats.inc_seen();
        }
        stats.inc_failed();

        ws.manager(50).save(17, &stats).unwrap();

        let checkpoint = ws.load().unwrap();
        assert_eq!(checkpoint.pages_completed, 17);
        assert_eq!(checkpoint.batch_url, STORE);
        assert_eq!(checkpoint.stats.pages_seen, 3);
        assert_eq!(checkpoint.stats.pages_failed, 1);
    }

    #[test]
    fn touched_dump_is_not_resumed() {
        let ws = Workspace::new();
        ws.manager(50).save(5, &RunStats::new()).unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&ws.dump)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(ws.load().is_none());
    }

    #[test]
    fn other_graph_store_is_not_resumed() {
        let ws = Workspace::new();
        ws.manager(50).save(5, &RunStats::new()).unwrap();
        let found = load_if_valid(ws.dump(), ws.state(), "http://graph.internal:7474/db/data/batch");
        assert!(found.unwrap().is_none());
    }

    #[test]
    fn other_dump_is_not_resumed() {
        let ws = Workspace::new();
        ws.manager(50).save(5, &RunStats::new()).unwrap();

        let copy = ws.dir.path().join("copy.xml");
        fs::copy(&ws.dump, &copy).unwrap();
        let found = load_if_valid(copy.to_str().unwrap(), ws.state(), STORE);
        assert!(found.unwrap().is_none());
    }

    #[test]
    fn older_format_is_not_resumed() {
        let ws = Workspace::new();
        let stale = Checkpoint {
            version: CHECKPOINT_VERSION + 1,
            input_path: ws.dump().to_string(),
            input_mtime: modified_secs(ws.dump()).unwrap(),
            batch_url: STORE.to_string(),
            pages_completed: 9,
            stats: CheckpointStats::default(),
        };
        let bytes = bincode::options().serialize(&stale).unwrap();
        fs::write(checkpoint_path(ws.state()), bytes).unwrap();

        assert!(ws.load().is_none());
    }

    #[test]
    fn garbage_file_is_ignored() {
        let ws = Workspace::new();
        fs::write(checkpoint_path(ws.state()), b"\xff\xfe definitely not a checkpoint").unwrap();
        assert!(ws.load().is_none());
    }

    #[test]
    fn saves_once_per_interval() {
        let ws = Workspace::new();
        let mut manager = ws.manager(2);
        let stats = RunStats::new();

        let saved: Vec<bool> = (1..=5)
            .map(|page| manager.maybe_save(page, &stats).unwrap())
            .collect();
        assert_eq!(saved, vec![false, true, false, true, false]);
        assert_eq!(ws.load().unwrap().pages_completed, 4);
    }

    #[test]
    fn clean_finish_removes_checkpoint() {
        let ws = Workspace::new();
        let manager = ws.manager(1);
        manager.save(1, &RunStats::new()).unwrap();

        assert!(!manager.finish_run(1, &RunStats::new(), true).unwrap());
        assert!(!checkpoint_path(ws.state()).exists());
    }

    #[test]
    fn run_stopped_by_limit_keeps_checkpoint() {
        let ws = Workspace::new();
        let manager = ws.manager(1000);

        assert!(manager.finish_run(7, &RunStats::new(), false).unwrap());
        assert_eq!(ws.load().unwrap().pages_completed, 7);
    }

    #[test]
    fn run_with_failed_pages_keeps_checkpoint() {
        let ws = Workspace::new();
        let manager = ws.manager(1000);
        let stats = RunStats::new();
        stats.inc_failed();

        assert!(manager.finish_run(12, &stats, true).unwrap());
        let checkpoint = ws.load().unwrap();
        assert_eq!(checkpoint.pages_completed, 12);
        assert_eq!(checkpoint.stats.pages_failed, 1);
    }

    #[test]
    fn clearing_missing_checkpoint_is_fine() {
        let ws = Workspace::new();
        assert!(clear(ws.state()).is_ok());
        assert!(ws.manager(1).clear().is_ok());
    }
}
