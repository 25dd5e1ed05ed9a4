//! Package lifecycle operations (toggle, supersede, resolve conflicts).
//!
//! This module mutates the library directly:
//! - Toggle: flip a package between enabled and disabled by renaming it
//! - Disable old versions: keep only the newest enabled version of a package
//! - Resolve conflicts: merge identical copies and move the survivor to the
//!   library root
//!
//! Operations are synchronous and take no locks; callers serialize
//! operations on the same path.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LibraryError, Result};
use crate::package::{ends_with_ignore_ascii_case, PackageRecord, PackageState};

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Whether `a` and `b` name the same file on disk, through links or aliases.
#[cfg(unix)]
pub(crate) fn is_same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub(crate) fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Ensure `path` is a package inside `library_root`.
fn validate_package_path(path: &Path, library_root: &Path) -> Result<PackageState> {
    let violation = || LibraryError::SecurityViolation {
        path: path.to_path_buf(),
        root: library_root.to_path_buf(),
    };

    let normalized = normalize_lexically(path);
    if normalized.components().any(|c| c == Component::ParentDir)
        || !normalized.starts_with(normalize_lexically(library_root))
    {
        return Err(violation());
    }

    PackageState::from_path(path).ok_or_else(violation)
}

/// Enable or disable one package; returns its path afterwards.
///
/// With `merge`, an enabled package is moved to the library root, and an
/// already active copy there wins over the disabled source.
pub fn toggle(path: &Path, enable: bool, library_root: &Path, merge: bool) -> Result<PathBuf> {
    let current = validate_package_path(path, library_root)?;
    let target = if enable {
        PackageState::Enabled
    } else {
        PackageState::Disabled
    };

    if current == target {
        return Ok(path.to_path_buf());
    }

    let mut destination = PackageState::transition(path, target).ok_or_else(|| {
        LibraryError::SecurityViolation {
            path: path.to_path_buf(),
            root: library_root.to_path_buf(),
        }
    })?;
    if enable && merge {
        if let Some(name) = destination.file_name() {
            destination = library_root.join(name);
        }
    }

    if fs::symlink_metadata(&destination).is_ok() {
        if !enable {
            fs::remove_file(&destination)
                .map_err(|e| LibraryError::io("overwrite", &destination, e))?;
            debug!(path = ?destination, "Replaced existing disabled copy");
        } else if merge {
            fs::remove_file(path).map_err(|e| LibraryError::io("remove", path, e))?;
            info!(removed = ?path, kept = ?destination, "Merged into active package");
            return Ok(destination);
        } else {
            return Err(LibraryError::conflict(
                &destination,
                "a package with the same name is already active",
            ));
        }
    }

    fs::rename(path, &destination).map_err(|e| LibraryError::io("rename", path, e))?;
    info!(from = ?path, to = ?destination, enabled = enable, "Toggled package");

    Ok(destination)
}

/// Order two version strings, numerically when both are integers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) if x != y => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Disable every enabled version of `creator.name` except the newest.
///
/// Returns the new paths of the disabled packages.
pub fn disable_old_versions(
    records: &[PackageRecord],
    creator: &str,
    name: &str,
    library_root: &Path,
) -> Result<Vec<PathBuf>> {
    let mut group: Vec<&PackageRecord> = records
        .iter()
        .filter(|r| r.is_enabled() && r.meta.creator == creator && r.meta.package_name == name)
        .collect();

    if group.len() < 2 {
        return Ok(Vec::new());
    }

    group.sort_by(|a, b| compare_versions(&b.meta.version, &a.meta.version));

    let mut disabled = Vec::with_capacity(group.len() - 1);
    for record in &group[1..] {
        disabled.push(toggle(record.path(), false, library_root, false)?);
    }
    info!(kept = %group[0].file.file_name, disabled = disabled.len(), "Disabled old versions");

    Ok(disabled)
}

/// How [`resolve_conflicts_with`] decides two files are the same package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityCheck {
    /// Equal byte length.
    #[default]
    Size,
    /// Equal byte length and MD5 digest.
    Digest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub merged: usize,
    pub disabled: usize,
    /// Where the kept package lives afterwards.
    pub final_path: PathBuf,
}

fn file_digest(path: &Path) -> io::Result<md5::Digest> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(context.compute())
}

fn same_package(keep: &Path, keep_size: u64, other: &Path, other_size: u64, check: IdentityCheck) -> bool {
    if keep_size != other_size {
        return false;
    }
    match check {
        IdentityCheck::Size => true,
        IdentityCheck::Digest => match (file_digest(keep), file_digest(other)) {
            (Ok(a), Ok(b)) => a == b,
            (Err(e), _) | (_, Err(e)) => {
                warn!(keep = ?keep, other = ?other, error = %e, "Digest comparison failed");
                false
            }
        },
    }
}

/// Merge or disable `others` against `keep`, then move `keep` to the root.
///
/// Files are compared by size only.
pub fn resolve_conflicts(keep: &Path, others: &[PathBuf], library_root: &Path) -> Result<ResolveOutcome> {
    resolve_conflicts_with(keep, others, library_root, IdentityCheck::Size)
}

/// [`resolve_conflicts`] with an explicit identity check.
pub fn resolve_conflicts_with(
    keep: &Path,
    others: &[PathBuf],
    library_root: &Path,
    check: IdentityCheck,
) -> Result<ResolveOutcome> {
    let keep_size = fs::metadata(keep)
        .map_err(|e| LibraryError::access(keep, e))?
        .len();

    let mut outcome = ResolveOutcome {
        merged: 0,
        disabled: 0,
        final_path: keep.to_path_buf(),
    };

    for other in others {
        if other.as_path() == keep || is_same_file(other, keep) {
            debug!(path = ?other, "Skipping alias of the kept package");
            continue;
        }

        let other_size = match fs::metadata(other) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                debug!(path = ?other, error = %e, "Conflicting copy is gone");
                continue;
            }
        };

        if same_package(keep, keep_size, other, other_size, check) {
            match fs::remove_file(other) {
                Ok(()) => outcome.merged += 1,
                Err(e) => warn!(path = ?other, error = %e, "Failed to delete duplicate"),
            }
            continue;
        }

        let name = other.to_string_lossy();
        if ends_with_ignore_ascii_case(&name, ".disabled") {
            continue;
        }
        let disabled_path = PathBuf::from(format!("{name}.disabled"));
        match fs::rename(other, &disabled_path) {
            Ok(()) => outcome.disabled += 1,
            Err(e) => warn!(path = ?other, error = %e, "Failed to disable conflicting copy"),
        }
    }

    let Some(file_name) = keep.file_name() else {
        return Ok(outcome);
    };
    let target = library_root.join(file_name);
    if normalize_lexically(keep) == normalize_lexically(&target) {
        return Ok(outcome);
    }
    if is_same_file(keep, &target) {
        debug!(keep = ?keep, target = ?target, "Kept package is already in the library root");
        outcome.final_path = target;
        return Ok(outcome);
    }

    if let Ok(existing) = fs::metadata(&target) {
        if !same_package(keep, keep_size, &target, existing.len(), check) {
            return Err(LibraryError::conflict(
                &target,
                "a different package with the same name is already in the library root",
            ));
        }
        fs::remove_file(&target).map_err(|e| LibraryError::io("overwrite", &target, e))?;
    }

    fs::rename(keep, &target).map_err(|e| LibraryError::io("move", keep, e))?;
    info!(from = ?keep, to = ?target, merged = outcome.merged, disabled = outcome.disabled, "Resolved conflicts");
    outcome.final_path = target;

    Ok(outcome)
}
