//! Library analysis pipeline.
//!
//! Turns a library root into a stream of [`PackageRecord`]s.
//!
//! # Design
//!
//! 1. The scanner runs once on the blocking pool to list every package.
//! 2. One task per package waits for a slot on a semaphore sized by
//!    `max_concurrency`, then parses the archive on the blocking pool.
//! 3. Each finished record is handed to the caller as soon as it is ready,
//!    together with throttled progress notifications.
//!
//! Per-call state lives in a [`ScanSession`] shared by the workers of that
//! call only. Callbacks are invoked while holding the session's completion
//! lock, so they never run concurrently and progress never goes backwards.
//!
//! # Cancellation
//!
//! The token is checked when a worker starts, raced against slot
//! acquisition, checked again once a slot is held and checked before a
//! record is emitted. A cancelled scan emits nothing further, waits for the
//! workers already running and returns [`LibraryError::Cancelled`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{self, ParseLimits};
use crate::config::EngineConfig;
use crate::error::{LibraryError, Result};
use crate::package::{ContentCategory, PackageFile, PackageRecord, ScanResult, UNKNOWN_TYPE};
use crate::postprocess::{check_dependencies, flag_duplicates};
use crate::scanner;

type RecordCallback = Box<dyn Fn(PackageRecord) + Send + Sync>;
type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Totals of one finished scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Packages found by the scanner.
    pub total: usize,
    /// Records handed to the caller.
    pub emitted: usize,
    /// Sorted, lower-cased tag vocabulary of the emitted records.
    pub tags: Vec<String>,
}

/// Parse one package into a record.
///
/// Never fails: an unreadable archive yields a record flagged corrupt with
/// the `Unknown` type.
pub fn build_record(file: PackageFile, limits: &ParseLimits) -> PackageRecord {
    let mut record = PackageRecord::new(file);

    match archive::parse(&record.file.path, limits) {
        Ok(parsed) => {
            let mut categories = parsed.categories;
            ContentCategory::sort_by_rank(&mut categories);
            record.primary_type = categories
                .first()
                .map(|category| category.to_string())
                .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
            record.categories = categories;
            record.meta = parsed.metadata;
            record.has_thumbnail = parsed.thumbnail.is_some();
        }
        Err(e) => {
            warn!(path = ?record.file.path, error = %e, "Failed to parse package");
            record.is_corrupt = true;
        }
    }

    record.meta.backfill_from_file_name(&record.file.file_name);

    for tag in &record.meta.tags {
        let tag = tag.to_lowercase();
        if !record.tags.contains(&tag) {
            record.tags.push(tag);
        }
    }

    record
}

/// Accumulators and callbacks of a single `scan` call.
struct ScanSession {
    total: usize,
    progress_interval: usize,
    limits: ParseLimits,
    cancel: CancellationToken,
    /// Records emitted so far; the lock also serializes callbacks.
    completed: Mutex<usize>,
    tags: Mutex<BTreeSet<String>>,
    on_record: RecordCallback,
    on_progress: ProgressCallback,
}

impl ScanSession {
    fn report_start(&self) {
        let _completed = self.completed.lock();
        (self.on_progress)(0, self.total);
    }

    /// Runs on the blocking pool.
    fn process(&self, file: PackageFile) {
        let record = build_record(file, &self.limits);
        self.emit(record);
    }

    fn emit(&self, record: PackageRecord) {
        let mut completed = self.completed.lock();
        if self.cancel.is_cancelled() {
            debug!(path = ?record.file.path, "Dropping record of cancelled scan");
            return;
        }

        self.tags.lock().extend(record.tags.iter().cloned());

        *completed += 1;
        let current = *completed;
        (self.on_record)(record);

        if current % self.progress_interval == 0 || current == self.total {
            (self.on_progress)(current, self.total);
        }
    }

    async fn run(self: Arc<Self>, file: PackageFile, slots: Arc<Semaphore>) {
        if self.cancel.is_cancelled() {
            return;
        }

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            permit = slots.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        if self.cancel.is_cancelled() {
            return;
        }

        let path = file.path.clone();
        let session = Arc::clone(&self);
        let joined = tokio::task::spawn_blocking(move || session.process(file)).await;
        drop(permit);

        if let Err(e) = joined {
            warn!(path = ?path, error = %e, "Package worker failed");
        }
    }
}

fn blocking_result<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(LibraryError::Cancelled),
    }
}

/// Bounded-concurrency analyzer over one or more libraries.
///
/// Scans on one analyzer are serialized; use separate analyzers to scan
/// libraries in parallel.
#[derive(Debug, Default)]
pub struct Analyzer {
    config: EngineConfig,
    gate: tokio::sync::Mutex<()>,
}

impl Analyzer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: config.validated(),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Scan `root` and stream one record per package to `on_record`.
    ///
    /// `on_progress(current, total)` is called with `(0, total)` first, then
    /// every `progress_interval` records and after the last one.
    pub async fn scan<R, P>(
        &self,
        cancel: &CancellationToken,
        root: &Path,
        on_record: R,
        on_progress: P,
    ) -> Result<ScanSummary>
    where
        R: Fn(PackageRecord) + Send + Sync + 'static,
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        let _gate = self.gate.lock().await;
        if cancel.is_cancelled() {
            return Err(LibraryError::Cancelled);
        }

        let root_path: PathBuf = root.to_path_buf();
        let files = blocking_result(
            tokio::task::spawn_blocking(move || scanner::scan(&root_path)).await,
        )?;
        let total = files.len();
        info!(root = ?root, total, "Scanning library");

        let session = Arc::new(ScanSession {
            total,
            progress_interval: self.config.progress_interval.max(1),
            limits: self.config.parse_limits(),
            cancel: cancel.clone(),
            completed: Mutex::new(0),
            tags: Mutex::new(BTreeSet::new()),
            on_record: Box::new(on_record),
            on_progress: Box::new(on_progress),
        });
        session.report_start();

        let slots = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut workers = JoinSet::new();
        for file in files {
            if cancel.is_cancelled() {
                break;
            }
            workers.spawn(Arc::clone(&session).run(file, Arc::clone(&slots)));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Scan worker aborted");
            }
        }

        let emitted = *session.completed.lock();
        if cancel.is_cancelled() {
            info!(root = ?root, emitted, total, "Scan cancelled");
            return Err(LibraryError::Cancelled);
        }

        let tags: Vec<String> = session.tags.lock().iter().cloned().collect();
        info!(root = ?root, emitted, tags = tags.len(), "Scan finished");

        Ok(ScanSummary {
            total,
            emitted,
            tags,
        })
    }

    /// Scan `root`, then flag duplicates and missing dependencies.
    ///
    /// Packages are sorted by path.
    pub async fn scan_library(&self, cancel: &CancellationToken, root: &Path) -> Result<ScanResult> {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);

        let summary = self
            .scan(cancel, root, move |record| sink.lock().push(record), |_, _| {})
            .await?;

        let mut packages = std::mem::take(&mut *collected.lock());
        packages.sort_by(|a, b| a.file.path.cmp(&b.file.path));
        flag_duplicates(&mut packages);
        check_dependencies(&mut packages);

        Ok(ScanResult {
            packages,
            tags: summary.tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_archive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn hair_package(root: &Path, file_name: &str, tags: &str) {
        let meta = format!(r#"{{"creator":"Acme","packageName":"Hair","version":"1","tags":"{tags}"}}"#);
        write_archive(
            &root.join(file_name),
            &[
                ("meta.json", meta.as_bytes()),
                ("Custom/Hair/Acme/bob.vam", b"{}"),
                ("Custom/Hair/Acme/bob.jpg", b"jpg"),
            ],
        );
    }

    fn library(count: usize) -> TempDir {
        let temp = TempDir::new().unwrap();
        for i in 0..count {
            hair_package(temp.path(), &format!("Acme.Hair{i}.{i}.var"), "Short,BOB");
        }
        temp
    }

    #[test]
    fn test_build_record_ranks_categories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("acme.scenepack.3.var");
        write_archive(
            &path,
            &[
                ("Saves/scene/party.json", b"{}"),
                ("Custom/Clothing/Acme/dress.vam", br#"{"tags":"Dress"}"#),
            ],
        );
        let file = scanner::scan(temp.path()).unwrap().remove(0);

        let record = build_record(file, &ParseLimits::default());
        assert_eq!(record.primary_type, "Clothing");
        assert_eq!(
            record.categories,
            vec![ContentCategory::Clothing, ContentCategory::Scene]
        );
        assert_eq!(record.meta.creator, "Acme");
        assert_eq!(record.meta.package_name, "Scenepack");
        assert_eq!(record.meta.version, "3");
        assert_eq!(record.tags, vec!["dress"]);
        assert!(!record.has_thumbnail);
        assert!(!record.is_corrupt);
    }

    #[test]
    fn test_build_record_for_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Bad.Pack.2.var"), b"garbage").unwrap();
        let file = scanner::scan(temp.path()).unwrap().remove(0);

        let record = build_record(file, &ParseLimits::default());
        assert!(record.is_corrupt);
        assert_eq!(record.primary_type, UNKNOWN_TYPE);
        assert_eq!(record.meta.creator, "Bad");
    }

    #[tokio::test]
    async fn test_scan_streams_every_record_with_progress() {
        let temp = library(12);
        let analyzer = Analyzer::new(EngineConfig {
            max_concurrency: 3,
            ..EngineConfig::default()
        });

        let records = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(Mutex::new(Vec::new()));
        let (r, p) = (Arc::clone(&records), Arc::clone(&progress));

        let summary = analyzer
            .scan(
                &CancellationToken::new(),
                temp.path(),
                move |_| {
                    r.fetch_add(1, Ordering::SeqCst);
                },
                move |current, total| p.lock().push((current, total)),
            )
            .await
            .unwrap();

        assert_eq!(records.load(Ordering::SeqCst), 12);
        assert_eq!(summary.total, 12);
        assert_eq!(summary.emitted, 12);
        assert_eq!(summary.tags, vec!["bob", "short"]);
        assert_eq!(*progress.lock(), vec![(0, 12), (10, 12), (12, 12)]);
    }

    #[tokio::test]
    async fn test_empty_library_reports_zero_progress() {
        let temp = TempDir::new().unwrap();
        let progress = Arc::new(Mutex::new(Vec::new()));
        let p = Arc::clone(&progress);

        let summary = Analyzer::default()
            .scan(
                &CancellationToken::new(),
                temp.path(),
                |_| {},
                move |current, total| p.lock().push((current, total)),
            )
            .await
            .unwrap();

        assert_eq!(summary, ScanSummary::default());
        assert_eq!(*progress.lock(), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let err = Analyzer::default()
            .scan(&CancellationToken::new(), &temp.path().join("nope"), |_| {}, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::Access { .. }));
    }

    #[tokio::test]
    async fn test_pre_cancelled_scan_emits_nothing() {
        let temp = library(3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let records = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&records);
        let err = Analyzer::default()
            .scan(&cancel, temp.path(), move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }, |_, _| {})
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(records.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_scan_stops_emission() {
        let temp = library(8);
        let cancel = CancellationToken::new();
        let records = Arc::new(AtomicUsize::new(0));
        let (r, token) = (Arc::clone(&records), cancel.clone());

        let err = Analyzer::default()
            .scan(
                &cancel,
                temp.path(),
                move |_| {
                    r.fetch_add(1, Ordering::SeqCst);
                    token.cancel();
                },
                |_, _| {},
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(records.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_library_post_processes() {
        let temp = TempDir::new().unwrap();
        hair_package(temp.path(), "Acme.Hair.1.var", "short");
        hair_package(temp.path(), "Acme.Hair.2.var", "long");
        std::fs::write(temp.path().join("Broken.Pack.1.var"), b"nope").unwrap();

        let result = Analyzer::default()
            .scan_library(&CancellationToken::new(), temp.path())
            .await
            .unwrap();

        let names: Vec<&str> = result
            .packages
            .iter()
            .map(|p| p.file.file_name.as_str())
            .collect();
        assert_eq!(names, ["Acme.Hair.1.var", "Acme.Hair.2.var", "Broken.Pack.1.var"]);
        assert!(result.packages[0].is_duplicate && result.packages[1].is_duplicate);
        assert!(result.packages[2].is_corrupt);
        assert!(!result.packages[2].is_duplicate);
        assert!(result.packages[0].has_thumbnail);
        assert_eq!(result.tags, vec!["long", "short"]);
    }
}
