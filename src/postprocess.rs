//! Whole-library passes run after every record of a scan is known.
//!
//! - Duplicate detection groups enabled packages by their declared
//!   `creator.name` key, compared exactly as written.
//! - Dependency checking resolves each declared dependency against every
//!   package of the same scan, enabled or not, ignoring case.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::package::{Metadata, PackageRecord};

/// Enabled packages that share one creator/name identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictGroup {
    /// `creator.name` as declared.
    pub key: String,
    pub creator: String,
    pub name: String,
    pub paths: Vec<PathBuf>,
}

/// Groups of two or more enabled records sharing a `creator.name` key.
pub fn conflict_groups(records: &[PackageRecord]) -> Vec<ConflictGroup> {
    let mut grouped: BTreeMap<String, ConflictGroup> = BTreeMap::new();

    for record in records.iter().filter(|r| r.is_enabled()) {
        let key = record.meta.loose_id();
        if key == "." {
            continue;
        }

        grouped
            .entry(key.clone())
            .or_insert_with(|| ConflictGroup {
                key,
                creator: record.meta.creator.clone(),
                name: record.meta.package_name.clone(),
                paths: Vec::new(),
            })
            .paths
            .push(record.path().to_path_buf());
    }

    grouped
        .into_values()
        .filter(|group| group.paths.len() > 1)
        .collect()
}

/// Mark every member of a conflict group as a duplicate.
pub fn flag_duplicates(records: &mut [PackageRecord]) {
    let duplicates: HashSet<PathBuf> = conflict_groups(records)
        .into_iter()
        .inspect(|group| debug!(key = %group.key, versions = group.paths.len(), "Duplicate package"))
        .flat_map(|group| group.paths)
        .collect();

    for record in records.iter_mut() {
        record.is_duplicate = duplicates.contains(record.path());
    }
}

/// Known package identifiers of one scan, lower-cased.
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    ids: HashSet<String>,
}

impl DependencyIndex {
    pub fn from_records(records: &[PackageRecord]) -> Self {
        let mut ids = HashSet::with_capacity(records.len() * 2);
        for record in records {
            let meta = &record.meta;
            if meta.creator.is_empty() && meta.package_name.is_empty() {
                continue;
            }
            ids.insert(meta.strict_id().to_lowercase());
            ids.insert(meta.loose_id().to_lowercase());
        }
        Self { ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(&id.to_lowercase())
    }

    /// Declared dependencies of `meta` that no package in the index satisfies.
    ///
    /// A dependency is satisfied by its exact id or, failing that, by any
    /// version of the same `creator.name`.
    pub fn missing(&self, meta: &Metadata) -> Vec<String> {
        meta.dependencies
            .keys()
            .filter(|id| !self.satisfies(id))
            .cloned()
            .collect()
    }

    fn satisfies(&self, id: &str) -> bool {
        if self.contains(id) {
            return true;
        }

        let mut parts = id.split('.');
        match (parts.next(), parts.next()) {
            (Some(creator), Some(name)) => self.contains(&format!("{creator}.{name}")),
            _ => false,
        }
    }
}

/// Fill `missing_deps` on every record from the records of the same scan.
pub fn check_dependencies(records: &mut [PackageRecord]) {
    let index = DependencyIndex::from_records(records);
    for record in records.iter_mut() {
        record.missing_deps = index.missing(&record.meta);
    }
}
