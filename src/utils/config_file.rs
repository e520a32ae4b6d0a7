//! Load `.imgflow.toml` from a directory (CLI only). Library callers build a
//! [`PipelineConfig`] themselves.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::PipelineConfig;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct ImgflowToml {
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    paths: PathsSection,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSection {
    searchers: Option<usize>,
    producers: Option<usize>,
    consumers: Option<usize>,
    simple_workers: Option<usize>,
    channel_capacity: Option<usize>,
    poison_threshold: Option<u32>,
    search_limit: Option<usize>,
    restart_backoff_ms: Option<u64>,
    receive_timeout_ms: Option<u64>,
    idle_delay_ms: Option<u64>,
    drain_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsSection {
    db: Option<String>,
    source: Option<String>,
}

impl ImgflowToml {
    /// Parse a config document. Unknown keys are ignored.
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.paths.db.as_ref().map(PathBuf::from)
    }

    pub fn source_dir(&self) -> Option<PathBuf> {
        self.paths.source.as_ref().map(PathBuf::from)
    }
}

/// Load `.imgflow.toml` from `dir` if present. A missing file gives `None`; a malformed one is
/// logged and also gives `None`.
pub fn load_config_file(dir: &Path) -> Option<ImgflowToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    ImgflowToml::parse(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite config field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $cfg:expr, $sec_field:ident => $cfg_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $cfg.$cfg_field = v;
        }
    };
    ($sec:expr, $cfg:expr, $sec_field:ident => $cfg_field:ident, $conv:expr) => {
        if let Some(v) = $sec.$sec_field {
            $cfg.$cfg_field = $conv(v);
        }
    };
}

/// Apply file settings to `config` (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_config(file: &ImgflowToml, config: &mut PipelineConfig) {
    let p = &file.pipeline;
    apply_file_opt!(p, config, searchers => searchers);
    apply_file_opt!(p, config, producers => producers);
    apply_file_opt!(p, config, consumers => consumers);
    apply_file_opt!(p, config, simple_workers => simple_workers);
    apply_file_opt!(p, config, channel_capacity => channel_capacity);
    apply_file_opt!(p, config, poison_threshold => poison_threshold);
    apply_file_opt!(p, config, search_limit => search_limit);
    apply_file_opt!(p, config, restart_backoff_ms => restart_backoff, Duration::from_millis);
    apply_file_opt!(p, config, receive_timeout_ms => receive_timeout, Duration::from_millis);
    apply_file_opt!(p, config, idle_delay_ms => idle_delay, Duration::from_millis);
    apply_file_opt!(p, config, drain_grace_secs => drain_grace, Duration::from_secs);
}
