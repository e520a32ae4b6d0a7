//! Command handlers for run, enqueue and status.

use anyhow::{Context, Result};
use colored::Colorize;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::backend::{BlobStore, DirectorySource, MessageQueue, SqliteBackend};
use crate::engine::arg_parser::{Cli, Commands, RunArgs};
use crate::engine::progress::{create_counter, finish_bar, update_progress_bar};
use crate::pipeline::{Backends, Pipeline};
use crate::types::PipelineConfig;
use crate::utils::config::{ContainerNames, QueueNames};
use crate::utils::{apply_file_to_config, load_config_file, setup_logging};

/// How often the run loop checks for Ctrl+C and a pipeline that ended on its own.
const RUN_POLL: Duration = Duration::from_millis(200);

/// Dispatch a parsed command line.
pub fn handle_cli(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose());
    let cwd = std::env::current_dir().context("current directory")?;
    match &cli.command {
        Commands::Run(args) => handle_run(cli, args, &cwd),
        Commands::Enqueue { keywords } => handle_enqueue(cli, keywords, &cwd),
        Commands::Status => handle_status(cli, &cwd),
    }
}

fn open_backend(cli: &Cli, cwd: &Path) -> Result<SqliteBackend> {
    let file = load_config_file(cwd);
    let db_path = cli.db_path(cwd, file.as_ref());
    debug!("database: {}", db_path.display());
    SqliteBackend::open(&db_path).with_context(|| format!("open {}", db_path.display()))
}

/// Start the pipeline on the SQLite backend and run until Ctrl+C or a fatal worker error.
pub fn handle_run(cli: &Cli, args: &RunArgs, cwd: &Path) -> Result<()> {
    let file = load_config_file(cwd);
    let mut config = PipelineConfig::default();
    if let Some(f) = &file {
        apply_file_to_config(f, &mut config);
    }
    args.apply_to(&mut config);

    let source_dir = args.source_dir(cwd, file.as_ref());
    info!("searching images under {}", source_dir.display());
    let db = open_backend(cli, cwd)?;
    let backends = Backends::sqlite(&db, Arc::new(DirectorySource::new(source_dir)));

    let stop_requested = Arc::new(AtomicBool::new(false));
    let stop_requested_handler = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || {
        stop_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let (pipeline, completed) = Pipeline::start(config, backends)?;
    let bar = cli.verbose().then(|| create_counter("processed", " images"));
    let mut count = 0usize;

    while !stop_requested.load(Ordering::Relaxed) {
        match completed.recv_timeout(RUN_POLL) {
            Ok(item) => {
                count += 1;
                match &bar {
                    Some(bar) => update_progress_bar(bar, 1),
                    None => debug!("{} -> {}", item.source_file, item.result_file),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if pipeline.is_finished() {
                    warn!("pipeline ended on its own");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if let Some(bar) = &bar {
        finish_bar(bar);
    }

    let result = pipeline.stop();
    // Items finished while draining.
    count += completed.try_iter().count();
    info!("{} images processed", count);
    result
}

/// Send each non-blank keyword to the keywords queue.
pub fn handle_enqueue(cli: &Cli, keywords: &[String], cwd: &Path) -> Result<()> {
    let db = open_backend(cli, cwd)?;
    let queue = db.queue(QueueNames::KEYWORDS);
    let mut sent = 0;
    for keyword in keywords.iter().map(|k| k.trim()) {
        if keyword.is_empty() {
            warn!("skipping blank keyword");
            continue;
        }
        queue.send(keyword)?;
        sent += 1;
    }
    info!("{} keywords queued", sent);
    Ok(())
}

/// Print queue depths and stored image counts.
pub fn handle_status(cli: &Cli, cwd: &Path) -> Result<()> {
    let db = open_backend(cli, cwd)?;
    for name in [
        QueueNames::KEYWORDS,
        QueueNames::REQUESTS,
        QueueNames::SIMPLE_REQUESTS,
    ] {
        let n = db.queue(name).approximate_len()?;
        println!("{:>28}  {}", name.cyan(), n);
    }
    for name in [ContainerNames::ORIGINALS, ContainerNames::RESULTS] {
        let n = db.store(name).list_ids()?.len();
        println!("{:>28}  {}", name.green(), n);
    }
    Ok(())
}
