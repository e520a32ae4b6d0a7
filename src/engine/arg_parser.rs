use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::types::PipelineConfig;
use crate::utils::config::PackagePaths;
use crate::utils::{ImgflowToml, db_path_from_env};

/// Keyword-driven image pipeline over durable queues.
#[derive(Clone, Parser)]
#[command(name = "imgflow")]
#[command(about = "Search, fan out and process images through supervised worker pools.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Queue and blob database. Default: IMGFLOW_DB, then `.imgflow.toml`, then `.imgflow.db`.
    #[arg(long, short, global = true)]
    pub db: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Run every configured worker until Ctrl+C.
    Run(RunArgs),
    /// Post keywords to the keywords queue.
    Enqueue {
        #[arg(value_name = "KEYWORD", required = true, num_args = 1..)]
        keywords: Vec<String>,
    },
    /// Show queue depths and stored image counts.
    Status,
}

#[derive(Clone, Debug, Default, Args)]
pub struct RunArgs {
    /// Directory searched for images. Default: `.imgflow.toml`, then the current directory.
    #[arg(long, short = 's', value_name = "DIR")]
    pub source: Option<PathBuf>,

    #[arg(long)]
    pub searchers: Option<usize>,

    #[arg(long)]
    pub producers: Option<usize>,

    #[arg(long)]
    pub consumers: Option<usize>,

    #[arg(long)]
    pub simple_workers: Option<usize>,

    /// Producer → consumer channel capacity.
    #[arg(long, short = 'c')]
    pub capacity: Option<usize>,

    /// Deliveries after which a message is deleted unprocessed.
    #[arg(long)]
    pub poison_threshold: Option<u32>,
}

/// Overwrite config field from a CLI flag when given.
macro_rules! apply_cli_opt {
    ($args:expr, $cfg:expr, $arg_field:ident => $cfg_field:ident) => {
        if let Some(v) = $args.$arg_field {
            $cfg.$cfg_field = v;
        }
    };
}

impl RunArgs {
    /// Apply flags over `config` (after the config file).
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        apply_cli_opt!(self, config, searchers => searchers);
        apply_cli_opt!(self, config, producers => producers);
        apply_cli_opt!(self, config, consumers => consumers);
        apply_cli_opt!(self, config, simple_workers => simple_workers);
        apply_cli_opt!(self, config, capacity => channel_capacity);
        apply_cli_opt!(self, config, poison_threshold => poison_threshold);
    }

    pub fn source_dir(&self, cwd: &Path, file: Option<&ImgflowToml>) -> PathBuf {
        self.source
            .clone()
            .or_else(|| file.and_then(ImgflowToml::source_dir))
            .unwrap_or_else(|| cwd.to_path_buf())
    }
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    /// `--db`, then `IMGFLOW_DB` (env or `.env`), then the config file, then `.imgflow.db` in `cwd`.
    pub fn db_path(&self, cwd: &Path, file: Option<&ImgflowToml>) -> PathBuf {
        self.db
            .clone()
            .or_else(|| db_path_from_env(cwd))
            .or_else(|| file.and_then(ImgflowToml::db_path))
            .unwrap_or_else(|| cwd.join(PackagePaths::get().db_filename()))
    }
}
