use crate::canonical::page_links;
use crate::checkpoint::CheckpointManager;
use crate::config::PROGRESS_INTERVAL;
use crate::error::PipelineError;
use crate::import::GraphLoader;
use crate::page::parse_page;
use crate::parser::PageSource;
use crate::stats::RunStats;
use crate::store::GraphStore;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Stop after the first N pages of the dump.
    pub limit: Option<u64>,
    /// Leading pages already handled by a previous run.
    pub skip_pages: u64,
    /// Log and count pages the store rejects instead of aborting.
    pub continue_on_error: bool,
    pub show_progress: bool,
}

/// Streams pages from `source` and saves each one before reading the next.
///
/// Parse errors always abort. Load errors abort unless `continue_on_error`
/// is set. Returns the number of leading pages fully handled.
pub fn run_pipeline<P: PageSource, S: GraphStore>(
    source: &mut P,
    loader: &mut GraphLoader<S>,
    options: &PipelineOptions,
    stats: &RunStats,
    mut checkpoint: Option<&mut CheckpointManager>,
) -> Result<u64, PipelineError> {
    let pb = if options.show_progress {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };

    if options.skip_pages > 0 {
        info!(pages = options.skip_pages, "Skipping pages loaded by a previous run");
    }

    let mut position = 0u64;
    loop {
        if options.limit.is_some_and(|limit| position >= limit) {
            info!(limit = position, "Page limit reached");
            break;
        }

        let fragment = match source.next_page() {
            Ok(Some(fragment)) => fragment,
            Ok(None) => break,
            Err(source) => {
                return Err(PipelineError::Parse {
                    page: position + 1,
                    source,
                })
            }
        };
        position += 1;

        if position <= options.skip_pages {
            continue;
        }

        stats.inc_seen();
        let record = parse_page(&fragment).map_err(|source| PipelineError::Parse {
            page: position,
            source,
        })?;
        drop(fragment);

        if record.title.is_empty() {
            warn!(page = position, "Skipping page without a title");
            stats.inc_skipped();
        } else {
            let links = page_links(&record);
            stats.record_links(&links);

            match loader.save_page(&links) {
                Ok(summary) => stats.record_saved(&summary),
                Err(e) if options.continue_on_error => {
                    warn!(title = %links.title, error = %e, "Failed to load page, continuing");
                    stats.inc_failed();
                }
                Err(e) => {
                    return Err(PipelineError::Load {
                        title: links.title,
                        source: e,
                    })
                }
            }
        }

        if let Some(mgr) = checkpoint.as_deref_mut() {
            mgr.maybe_save(position, stats)
                .map_err(PipelineError::Checkpoint)?;
        }

        if position % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("{position} pages"));
            pb.tick();
            debug!(pages = position, edges = stats.edges(), "Progress");
        }
    }

    pb.finish_and_clear();
    info!(
        pages = stats.seen(),
        loaded = stats.loaded(),
        edges = stats.edges(),
        "Pipeline finished"
    );
    Ok(position)
}
