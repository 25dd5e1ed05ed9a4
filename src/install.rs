//! Copying packages into a library.
//!
//! Installation is a plain byte copy into the target library root. The
//! total size of the batch is checked against the free space of the target
//! volume before anything is written; after that, every file is handled on
//! its own and a failure only skips that file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::disk::DiskSpaceProvider;
use crate::error::{LibraryError, Result};
use crate::operations::is_same_file;
use crate::package::PackageState;

/// Per-file install status reported through progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Installing,
    Installed,
    Skipped,
    #[serde(rename = "error")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProgress {
    /// 1-based position of the file in the batch.
    pub current: usize,
    pub total: usize,
    pub file_name: String,
    pub status: InstallStatus,
}

/// Why a file was not installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum SkipReason {
    NotAPackage,
    Exists,
    CopyFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAPackage => f.write_str("ignored: not a package"),
            SkipReason::Exists => f.write_str("skipped: exists"),
            SkipReason::CopyFailed(e) => write!(f, "copy error: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOutcome {
    /// Destination paths of the copied files.
    pub installed: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

impl InstallOutcome {
    /// Message listing every file that was not installed, if any.
    pub fn skipped_summary(&self) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }

        let listed: Vec<String> = self
            .skipped
            .iter()
            .map(|skipped| format!("{} ({})", skipped.file_name, skipped.reason))
            .collect();
        Some(format!(
            "the following files were ignored or skipped: {}",
            listed.join(", ")
        ))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn batch_size(files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|file| fs::metadata(file).ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Copy `files` into `target_library`.
///
/// Fails before copying anything when the target cannot be created or the
/// volume is short of space. Files that cannot be installed are returned in
/// [`InstallOutcome::skipped`].
pub fn install<F>(
    files: &[PathBuf],
    target_library: &Path,
    overwrite: bool,
    disk: &dyn DiskSpaceProvider,
    mut on_progress: F,
) -> Result<InstallOutcome>
where
    F: FnMut(InstallProgress),
{
    fs::create_dir_all(target_library)
        .map_err(|e| LibraryError::io("create", target_library, e))?;

    let needed = batch_size(files);
    match disk.disk_space(target_library) {
        Ok(space) if space.free < needed => {
            return Err(LibraryError::InsufficientSpace {
                needed,
                available: space.free,
            });
        }
        Ok(_) => {}
        Err(e) => warn!(target = ?target_library, error = %e, "Disk space check failed, continuing"),
    }

    info!(target = ?target_library, count = files.len(), overwrite, "Installing packages");

    let total = files.len();
    let mut outcome = InstallOutcome::default();

    for (i, source) in files.iter().enumerate() {
        let file_name = display_name(source);
        let mut report = |status| {
            on_progress(InstallProgress {
                current: i + 1,
                total,
                file_name: file_name.clone(),
                status,
            })
        };

        let skip = if PackageState::from_path(source).is_none() {
            Some(SkipReason::NotAPackage)
        } else {
            let destination = target_library.join(&file_name);

            if is_same_file(source, &destination) {
                debug!(path = ?source, "Source and destination are the same file");
                report(InstallStatus::Skipped);
                continue;
            }

            if !overwrite && destination.is_file() {
                Some(SkipReason::Exists)
            } else {
                report(InstallStatus::Installing);
                match fs::copy(source, &destination) {
                    Ok(_) => {
                        report(InstallStatus::Installed);
                        outcome.installed.push(destination);
                        continue;
                    }
                    Err(e) => {
                        warn!(path = ?source, error = %e, "Failed to install package");
                        report(InstallStatus::Failed);
                        outcome.skipped.push(SkippedFile {
                            file_name,
                            reason: SkipReason::CopyFailed(e.to_string()),
                        });
                        continue;
                    }
                }
            }
        };

        if let Some(reason) = skip {
            debug!(file = %file_name, %reason, "Not installing");
            report(InstallStatus::Skipped);
            outcome.skipped.push(SkippedFile { file_name, reason });
        }
    }

    Ok(outcome)
}

/// File names in `files` that already exist in `target_library`.
pub fn check_collisions(files: &[PathBuf], target_library: &Path) -> Vec<String> {
    files
        .iter()
        .map(|file| display_name(file))
        .filter(|name| target_library.join(name).is_file())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskSpace;
    use std::io;
    use tempfile::TempDir;

    struct FixedDisk(Option<u64>);

    impl DiskSpaceProvider for FixedDisk {
        fn disk_space(&self, _path: &Path) -> io::Result<DiskSpace> {
            match self.0 {
                Some(free) => Ok(DiskSpace { free, total: free }),
                None => Err(io::Error::new(io::ErrorKind::Other, "no statfs")),
            }
        }
    }

    fn source_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_install_copies_and_reports_progress() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let target = library.path().join("AddonPackages");

        let files = vec![
            source_file(downloads.path(), "Acme.Pose.1.var", b"pose"),
            source_file(downloads.path(), "readme.txt", b"text"),
        ];

        let mut events = Vec::new();
        let outcome = install(&files, &target, false, &FixedDisk(Some(1024)), |p| {
            events.push((p.current, p.status))
        })
        .unwrap();

        assert_eq!(outcome.installed, vec![target.join("Acme.Pose.1.var")]);
        assert_eq!(fs::read(target.join("Acme.Pose.1.var")).unwrap(), b"pose");
        assert_eq!(outcome.skipped[0].reason, SkipReason::NotAPackage);
        assert_eq!(
            events,
            [
                (1, InstallStatus::Installing),
                (1, InstallStatus::Installed),
                (2, InstallStatus::Skipped),
            ]
        );
    }

    #[test]
    fn test_existing_destination_is_skipped_without_overwrite() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let files = vec![source_file(downloads.path(), "Acme.Pose.1.var.disabled", b"new")];
        fs::write(library.path().join("Acme.Pose.1.var.disabled"), b"old").unwrap();

        let outcome = install(&files, library.path(), false, &FixedDisk(None), |_| {}).unwrap();
        assert!(outcome.installed.is_empty());
        assert_eq!(
            outcome.skipped_summary().unwrap(),
            "the following files were ignored or skipped: Acme.Pose.1.var.disabled (skipped: exists)"
        );
        assert_eq!(
            fs::read(library.path().join("Acme.Pose.1.var.disabled")).unwrap(),
            b"old"
        );

        let outcome = install(&files, library.path(), true, &FixedDisk(None), |_| {}).unwrap();
        assert_eq!(outcome.installed.len(), 1);
        assert_eq!(outcome.skipped_summary(), None);
        assert_eq!(
            fs::read(library.path().join("Acme.Pose.1.var.disabled")).unwrap(),
            b"new"
        );
    }

    #[test]
    fn test_insufficient_space_copies_nothing() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let files = vec![source_file(downloads.path(), "Acme.Big.1.var", &[0u8; 64])];

        let err = install(&files, library.path(), true, &FixedDisk(Some(10)), |_| {}).unwrap_err();
        assert!(matches!(
            err,
            LibraryError::InsufficientSpace {
                needed: 64,
                available: 10
            }
        ));
        assert!(!library.path().join("Acme.Big.1.var").exists());
    }

    #[test]
    fn test_same_file_is_skipped_silently() {
        let library = TempDir::new().unwrap();
        let files = vec![source_file(library.path(), "Acme.Pose.1.var", b"pose")];

        let mut statuses = Vec::new();
        let outcome =
            install(&files, library.path(), true, &FixedDisk(Some(1024)), |p| statuses.push(p.status))
                .unwrap();
        assert!(outcome.installed.is_empty());
        assert!(outcome.skipped.is_empty());
        assert_eq!(statuses, [InstallStatus::Skipped]);
        assert_eq!(fs::read(&files[0]).unwrap(), b"pose");
    }

    #[test]
    fn test_hard_linked_destination_is_not_truncated() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let files = vec![source_file(downloads.path(), "Acme.Pose.1.var", b"original bytes")];
        fs::hard_link(&files[0], library.path().join("Acme.Pose.1.var")).unwrap();

        let outcome = install(&files, library.path(), true, &FixedDisk(Some(1024)), |_| {}).unwrap();
        assert!(outcome.installed.is_empty());
        assert_eq!(fs::read(&files[0]).unwrap(), b"original bytes");
        assert_eq!(
            fs::read(library.path().join("Acme.Pose.1.var")).unwrap(),
            b"original bytes"
        );
    }

    #[test]
    fn test_copy_failure_skips_only_that_file() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        fs::create_dir(library.path().join("Acme.Blocked.1.var")).unwrap();

        let files = vec![
            source_file(downloads.path(), "Acme.Blocked.1.var", b"blocked"),
            source_file(downloads.path(), "Acme.Pose.1.var", b"pose"),
        ];

        let mut events = Vec::new();
        let outcome = install(&files, library.path(), true, &FixedDisk(Some(1024)), |p| {
            events.push((p.current, p.status))
        })
        .unwrap();

        assert_eq!(outcome.installed, vec![library.path().join("Acme.Pose.1.var")]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].file_name, "Acme.Blocked.1.var");
        assert!(matches!(outcome.skipped[0].reason, SkipReason::CopyFailed(_)));
        assert!(outcome
            .skipped_summary()
            .unwrap()
            .contains("Acme.Blocked.1.var (copy error: "));
        assert_eq!(
            events,
            [
                (1, InstallStatus::Installing),
                (1, InstallStatus::Failed),
                (2, InstallStatus::Installing),
                (2, InstallStatus::Installed),
            ]
        );
    }

    #[test]
    fn test_check_collisions() {
        let downloads = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        fs::write(library.path().join("Acme.Pose.1.var"), b"x").unwrap();

        let files = vec![
            downloads.path().join("Acme.Pose.1.var"),
            downloads.path().join("Acme.Pose.2.var"),
        ];
        assert_eq!(check_collisions(&files, library.path()), vec!["Acme.Pose.1.var"]);
    }
}
