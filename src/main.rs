use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use wikigraph::checkpoint::{self, CheckpointManager};
use wikigraph::extract::{run_pipeline, PipelineOptions};
use wikigraph::import::{GraphLoader, LoaderConfig};
use wikigraph::parser::open_dump;
use wikigraph::stats::RunStats;
use wikigraph::store::{GraphStore, MemoryStore, RestBatchStore, RestStoreConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikigraph")]
#[command(about = "Load the link graph of a wiki XML dump into a graph store")]
struct Cli {
    /// Path to the dump (.xml or .xml.bz2); reads stdin when omitted or "-"
    input: Option<String>,

    /// Graph store batch endpoint
    #[arg(long, default_value = wikigraph::config::DEFAULT_BATCH_URL)]
    batch_url: String,

    /// Unique-node index that keys pages by title
    #[arg(long, default_value = wikigraph::config::DEFAULT_NODE_INDEX)]
    index: String,

    /// Split pages into batches of at most this many operations
    /// (default: one batch per page)
    #[arg(long)]
    max_batch_ops: Option<usize>,

    /// Limit number of pages to process (for testing)
    #[arg(long)]
    limit: Option<u64>,

    /// Dry run - load into an in-memory graph instead of the store
    #[arg(long)]
    dry_run: bool,

    /// Directory for the resume checkpoint (file input only)
    #[arg(long)]
    checkpoint_dir: Option<String>,

    /// Checkpoint interval in pages processed
    #[arg(long, default_value_t = wikigraph::config::CHECKPOINT_INTERVAL)]
    checkpoint_interval: u32,

    /// Resume from last checkpoint if available
    #[arg(long, requires = "checkpoint_dir")]
    resume: bool,

    /// Log pages the store rejects and keep going instead of aborting
    #[arg(long)]
    continue_on_error: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn file_input(cli: &Cli) -> Option<&str> {
    cli.input.as_deref().filter(|path| *path != "-")
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let input = file_input(&cli);

    if cli.checkpoint_dir.is_some() && input.is_none() {
        bail!("--checkpoint-dir needs a dump file; stdin cannot be resumed");
    }

    let mut checkpoint_mgr = match (&cli.checkpoint_dir, input) {
        (Some(dir), Some(path)) if !cli.dry_run => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create checkpoint directory: {dir}"))?;
            Some(CheckpointManager::new(
                path,
                dir,
                &cli.batch_url,
                cli.checkpoint_interval,
            )?)
        }
        _ => None,
    };

    let resumed = match (&cli.checkpoint_dir, input) {
        (Some(dir), Some(path)) if cli.resume && !cli.dry_run => {
            checkpoint::load_if_valid(path, dir, &cli.batch_url)?
        }
        _ => None,
    };

    let (stats, skip_pages) = match resumed {
        Some(cp) => {
            info!(pages = cp.pages_completed, "Resuming from checkpoint");
            (RunStats::from_checkpoint(&cp.stats), cp.pages_completed)
        }
        None => (RunStats::new(), 0),
    };

    let mut scanner = open_dump(input)
        .with_context(|| format!("Failed to open wiki dump at: {}", input.unwrap_or("<stdin>")))?;

    let loader_config = LoaderConfig {
        index: cli.index.clone(),
        max_batch_ops: cli.max_batch_ops,
        ..LoaderConfig::default()
    };
    let options = PipelineOptions {
        limit: cli.limit,
        skip_pages,
        continue_on_error: cli.continue_on_error,
        show_progress: cli.verbose > 0,
    };

    let pages = if cli.dry_run {
        info!("Dry run: loading into an in-memory graph");
        let mut loader = GraphLoader::new(MemoryStore::new(), loader_config);
        let pages = load(&mut scanner, &mut loader, &options, &stats, None)?;
        let store = loader.into_store();
        println!("Distinct nodes:     {}", store.node_count());
        pages
    } else {
        let store = RestBatchStore::new(&RestStoreConfig::new(cli.batch_url.as_str()))
            .context("Failed to build graph store client")?;
        info!(url = %store.batch_url(), "Loading into graph store");
        let mut loader = GraphLoader::new(store, loader_config);
        load(
            &mut scanner,
            &mut loader,
            &options,
            &stats,
            checkpoint_mgr.as_mut(),
        )?
    };

    if let Some(ref mgr) = checkpoint_mgr {
        let reached_end = !cli.limit.is_some_and(|limit| pages >= limit);
        match mgr.finish_run(pages, &stats, reached_end) {
            Ok(true) => info!(
                pages,
                failed = stats.failed(),
                "Checkpoint kept; rerun with --resume to continue"
            ),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to settle checkpoint"),
        }
    }

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    println!("Pages seen:         {}", stats.seen());
    println!("Pages loaded:       {}", stats.loaded());
    println!("Pages skipped:      {}", stats.skipped());
    println!("Pages failed:       {}", stats.failed());
    println!("Links found:        {}", stats.raw());
    println!("Valid links:        {}", stats.valid());
    println!("Rejected links:     {}", stats.rejected());
    println!("Duplicate links:    {}", stats.duplicates());
    println!("Node upserts:       {}", stats.nodes());
    println!("Edges created:      {}", stats.edges());
    println!("Batches sent:       {}", stats.batches());

    Ok(())
}

fn load<S: GraphStore>(
    scanner: &mut wikigraph::parser::PageScanner<Box<dyn std::io::BufRead>>,
    loader: &mut GraphLoader<S>,
    options: &PipelineOptions,
    stats: &RunStats,
    checkpoint: Option<&mut CheckpointManager>,
) -> Result<u64> {
    let pages = run_pipeline(scanner, loader, options, stats, checkpoint)?;
    info!(pages, "Dump processed");
    Ok(pages)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    match run(cli) {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
