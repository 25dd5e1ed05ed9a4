//! Package discovery for VarDepot.
//!
//! A library is any directory tree. Every regular file below it whose name
//! ends in `.var` (enabled) or `.var.disabled` (disabled), compared
//! case-insensitively, is a package. Nothing is opened here; archive
//! contents are the parser's job.
//!
//! # Error policy
//!
//! - The root itself must be readable, otherwise the whole call fails.
//! - Unreadable entries below the root are skipped so one bad folder does
//!   not hide the rest of the library.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{LibraryError, Result};
use crate::package::{PackageFile, PackageState};

fn ensure_root(root: &Path) -> Result<()> {
    fs::metadata(root)
        .map(|_| ())
        .map_err(|e| LibraryError::access(root, e))
}

/// Walks `root` and yields every package entry with its state.
fn walk_packages(root: &Path) -> impl Iterator<Item = (DirEntry, PackageState)> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable library entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let state = entry.file_name().to_str().and_then(PackageState::from_file_name)?;
            Some((entry, state))
        })
}

/// Scans a library root and returns every package found below it.
pub fn scan(root: &Path) -> Result<Vec<PackageFile>> {
    ensure_root(root)?;

    let mut packages = Vec::new();
    for (entry, state) in walk_packages(root) {
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = ?entry.path(), error = %e, "Skipping package without metadata");
                continue;
            }
        };

        packages.push(PackageFile {
            path: entry.path().to_path_buf(),
            file_name: entry.file_name().to_string_lossy().to_string(),
            size: metadata.len(),
            state,
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    Ok(packages)
}

/// Counts packages below `root` without building records.
pub fn count_packages(root: &Path) -> Result<usize> {
    ensure_root(root)?;
    Ok(walk_packages(root).count())
}

/// Counts packages for several libraries; an unreadable library counts as 0.
pub fn count_libraries<P: AsRef<Path>>(roots: &[P]) -> BTreeMap<PathBuf, usize> {
    let mut counts = BTreeMap::new();

    for root in roots {
        let root = root.as_ref();
        let count = match count_packages(root) {
            Ok(count) => count,
            Err(e) => {
                warn!(library = ?root, error = %e, "Failed to count library packages");
                0
            }
        };
        counts.insert(root.to_path_buf(), count);
    }

    counts
}
