//! Image search over a local directory tree.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::BackendError;
use crate::types::SourceImage;

use super::{ImageSource, content_type_for};

/// Finds image files under `root` whose file stem contains the keyword (case-insensitive).
/// Results are ordered by path so repeated searches return the same files. Matches that
/// cannot be read (a dangling symlink, a permission error) are logged and skipped.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
    follow_links: bool,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
        }
    }

    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn stem_matches(path: &Path, needle: &str) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.to_lowercase().contains(needle))
}

impl ImageSource for DirectorySource {
    fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SourceImage>, BackendError> {
        if !self.root.is_dir() {
            return Err(BackendError::Misconfigured(format!(
                "image source {} is not a directory",
                self.root.display()
            )));
        }
        let needle = keyword.trim().to_lowercase();
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
        {
            if found.len() >= limit {
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    debug!("skipping unreadable path: {}", err);
                    continue;
                }
            };
            let path = entry.path();
            let candidate = entry.file_type().is_file() || entry.path_is_symlink();
            if !candidate || !stem_matches(path, &needle) {
                continue;
            }
            let Some(content_type) = content_type_for(path) else {
                continue;
            };
            let bytes = match std::fs::read(path) {
                Ok(b) => b,
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            found.push(SourceImage {
                name: entry.file_name().to_string_lossy().into_owned(),
                content_type: content_type.to_string(),
                bytes,
            });
        }
        debug!("search '{}' found {} images", keyword, found.len());
        Ok(found)
    }
}
