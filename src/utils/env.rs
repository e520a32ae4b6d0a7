//! Database path override: env var → `.env` in the working directory.

use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

fn non_empty_var(key: &str) -> Option<String> {
    let s = std::env::var(key).ok()?;
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Read `IMGFLOW_DB` from the environment, loading `dir/.env` first if the variable is unset.
pub fn db_path_from_env(dir: &Path) -> Option<PathBuf> {
    let key = PackagePaths::get().db_env_key();
    if let Some(s) = non_empty_var(&key) {
        return Some(PathBuf::from(s));
    }
    let env_path = dir.join(".env");
    if env_path.is_file() {
        let _ = dotenvy::from_path(&env_path);
        return non_empty_var(&key).map(PathBuf::from);
    }
    None
}
