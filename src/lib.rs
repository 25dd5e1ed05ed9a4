//! VarDepot Core Library
//!
//! Library engine for `.var` content packages: discovery, metadata
//! extraction, classification, preview selection and lifecycle management.
//!
//! # Architecture
//!
//! This library is designed to be consumed in-process by native front ends:
//! - **Rust**: the `vardepot` CLI and any Rust host link the rlib
//! - **macOS / Windows**: static lib or DLL through the C ABI in `ffi`
//!
//! Control flows one way, scan → parse → normalize → stream to the caller.
//! Lifecycle operations are independent entry points that mutate the
//! filesystem directly, addressed by absolute path. Nothing is cached
//! between calls.
//!
//! # Core Features
//!
//! ## Discovery (`scanner` module)
//! - `scan()` - Find every enabled/disabled package below a root
//! - `count_packages()` / `count_libraries()` - Cheap package counts
//!
//! ## Archive Parsing (`archive`, `classify`, `encoding`, `thumbnail` modules)
//! - `parse()` - Manifest, categories, tags and preview of one archive
//! - `read_thumbnail()` - Preview bytes on demand
//! - `package_contents()` - Displayable items inside one archive
//!
//! ## Analysis (`analysis`, `postprocess` modules)
//! - `Analyzer::scan()` - Bounded-concurrency, cancellable record stream
//! - `Analyzer::scan_library()` - Full result with duplicates and missing dependencies
//!
//! ## Lifecycle (`operations`, `install` modules)
//! - `toggle()` - Enable/disable by renaming
//! - `disable_old_versions()` - Keep only the newest enabled version
//! - `resolve_conflicts()` - Merge identical copies into the library root
//! - `install()` / `check_collisions()` - Copy packages into a library

pub mod analysis;
pub mod archive;
pub mod classify;
pub mod config;
pub mod contents;
pub mod disk;
pub mod encoding;
pub mod error;
pub mod ffi;
pub mod install;
pub mod operations;
pub mod package;
pub mod postprocess;
pub mod scanner;
pub mod thumbnail;

pub use analysis::{Analyzer, ScanSummary};
pub use archive::{ParseLimits, ParsedArchive, Thumbnail};
pub use config::EngineConfig;
pub use contents::PackageContent;
pub use disk::{DiskSpace, DiskSpaceProvider, SystemDiskSpace};
pub use error::{ErrorKind, LibraryError, Result};
pub use install::{InstallOutcome, InstallProgress, InstallStatus, SkipReason, SkippedFile};
pub use operations::{IdentityCheck, ResolveOutcome};
pub use package::{
    ContentCategory, Metadata, PackageFile, PackageRecord, PackageState, ScanResult,
};
pub use postprocess::{ConflictGroup, DependencyIndex};
