use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File name suffix of an active package.
pub const ENABLED_SUFFIX: &str = ".var";

/// File name suffix of a deactivated package.
pub const DISABLED_SUFFIX: &str = ".var.disabled";

const DISABLED_MARKER: &str = ".disabled";

/// Primary type of a record whose archive yielded no category.
pub const UNKNOWN_TYPE: &str = "Unknown";

pub(crate) fn ends_with_ignore_ascii_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value.as_bytes()[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Activation state of a package, encoded only in its file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    Enabled,
    Disabled,
}

impl PackageState {
    /// Classify a file name; `None` for anything that is not a package.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if ends_with_ignore_ascii_case(name, DISABLED_SUFFIX) {
            Some(PackageState::Disabled)
        } else if ends_with_ignore_ascii_case(name, ENABLED_SUFFIX) {
            Some(PackageState::Enabled)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::from_file_name)
    }

    pub fn is_enabled(self) -> bool {
        self == PackageState::Enabled
    }

    /// The only state transition: the path `path` takes in `target` state.
    ///
    /// Returns the input unchanged when it is already in `target` state and
    /// `None` when `path` is not a package.
    pub fn transition(path: &Path, target: PackageState) -> Option<PathBuf> {
        let current = Self::from_path(path)?;
        if current == target {
            return Some(path.to_path_buf());
        }

        let raw = path.to_str()?;
        match target {
            PackageState::Disabled => Some(PathBuf::from(format!("{raw}{DISABLED_MARKER}"))),
            PackageState::Enabled => {
                Some(PathBuf::from(&raw[..raw.len() - DISABLED_MARKER.len()]))
            }
        }
    }

    /// File name without its package suffix (`Creator.Name.1`).
    pub fn strip_suffix(file_name: &str) -> &str {
        match Self::from_file_name(file_name) {
            Some(PackageState::Disabled) => {
                &file_name[..file_name.len() - DISABLED_SUFFIX.len()]
            }
            Some(PackageState::Enabled) => &file_name[..file_name.len() - ENABLED_SUFFIX.len()],
            None => file_name,
        }
    }
}

/// A package archive discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub state: PackageState,
    pub modified: Option<DateTime<Utc>>,
}

impl PackageFile {
    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }
}

/// Content label inferred from the internal layout of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ContentCategory {
    Scene,
    Look,
    Clothing,
    Hair,
    Morph,
    Skin,
    Script,
    Asset,
    Environment,
    Other(String),
}

impl ContentCategory {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Scene" => ContentCategory::Scene,
            "Look" => ContentCategory::Look,
            "Clothing" => ContentCategory::Clothing,
            "Hair" => ContentCategory::Hair,
            "Morph" => ContentCategory::Morph,
            "Skin" => ContentCategory::Skin,
            "Script" => ContentCategory::Script,
            "Asset" => ContentCategory::Asset,
            "Environment" => ContentCategory::Environment,
            other => ContentCategory::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentCategory::Scene => "Scene",
            ContentCategory::Look => "Look",
            ContentCategory::Clothing => "Clothing",
            ContentCategory::Hair => "Hair",
            ContentCategory::Morph => "Morph",
            ContentCategory::Skin => "Skin",
            ContentCategory::Script => "Script",
            ContentCategory::Asset => "Asset",
            ContentCategory::Environment => "Environment",
            ContentCategory::Other(name) => name,
        }
    }

    /// Position in the primary-type ordering; lower wins.
    pub fn rank(&self) -> u8 {
        match self {
            // Character content
            ContentCategory::Look => 0,
            ContentCategory::Clothing => 1,
            ContentCategory::Hair => 2,
            ContentCategory::Skin => 3,
            ContentCategory::Morph => 4,
            // Functionality
            ContentCategory::Script => 5,
            // World
            ContentCategory::Scene => 6,
            ContentCategory::Environment => 7,
            ContentCategory::Asset => 8,
            ContentCategory::Other(_) => 99,
        }
    }

    /// Sort by rank, ties alphabetical, so the first entry is the primary type.
    pub fn sort_by_rank(categories: &mut [ContentCategory]) {
        categories.sort_by(|a, b| {
            a.rank()
                .cmp(&b.rank())
                .then_with(|| a.as_str().cmp(b.as_str()))
        });
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ContentCategory {
    fn from(label: String) -> Self {
        ContentCategory::from_label(&label)
    }
}

impl From<ContentCategory> for String {
    fn from(category: ContentCategory) -> Self {
        category.as_str().to_string()
    }
}

/// Normalized package manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub creator: String,
    pub package_name: String,
    pub version: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Dependency id (`Creator.Package.Version`) to its license/url entry.
    pub dependencies: BTreeMap<String, Value>,
    pub content_list: Vec<String>,
    pub image_url: Option<String>,
}

fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub(crate) fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Metadata {
    /// Build metadata from a decoded manifest document.
    ///
    /// Wrongly typed fields are ignored rather than rejecting the document.
    pub fn from_manifest(doc: &Value) -> Self {
        let creator = non_empty(lenient_string(doc.get("creator")))
            .or_else(|| lenient_string(doc.get("creatorName")))
            .unwrap_or_default();

        let tags = match doc.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| lenient_string(Some(item)))
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            Some(Value::String(joined)) => split_tag_list(joined),
            _ => Vec::new(),
        };

        let dependencies = match doc.get("dependencies") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect(),
            _ => BTreeMap::new(),
        };

        let content_list = match doc.get("contentList") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        Metadata {
            creator,
            package_name: lenient_string(doc.get("packageName")).unwrap_or_default(),
            version: lenient_string(doc.get("version")).unwrap_or_default(),
            description: non_empty(lenient_string(doc.get("description"))),
            tags,
            dependencies,
            content_list,
            image_url: non_empty(lenient_string(doc.get("imageUrl"))),
        }
    }

    /// Add tags not already present, preserving order.
    pub fn merge_tags<I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = String>,
    {
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }

    /// Fill blank creator/name/version from a `Creator.Name.Version` file name.
    pub fn backfill_from_file_name(&mut self, file_name: &str) {
        if !self.creator.is_empty() && !self.package_name.is_empty() && !self.version.is_empty() {
            return;
        }

        let parts: Vec<&str> = PackageState::strip_suffix(file_name).split('.').collect();
        if parts.len() < 3 {
            return;
        }

        if self.creator.is_empty() {
            self.creator = capitalize_first(parts[0]);
        }
        if self.package_name.is_empty() {
            self.package_name = capitalize_first(parts[1]);
        }
        if self.version.is_empty() {
            self.version = parts[parts.len() - 1].to_string();
        }
    }

    /// `creator.name.version` as declared.
    pub fn strict_id(&self) -> String {
        format!("{}.{}.{}", self.creator, self.package_name, self.version)
    }

    /// `creator.name` as declared.
    pub fn loose_id(&self) -> String {
        format!("{}.{}", self.creator, self.package_name)
    }
}

/// Split a comma separated tag field, dropping blanks.
pub(crate) fn split_tag_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// A package with everything the engine derived from it during one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    #[serde(flatten)]
    pub file: PackageFile,
    pub meta: Metadata,
    #[serde(rename = "type")]
    pub primary_type: String,
    pub categories: Vec<ContentCategory>,
    pub tags: Vec<String>,
    pub missing_deps: Vec<String>,
    pub is_duplicate: bool,
    pub is_corrupt: bool,
    pub has_thumbnail: bool,
}

impl PackageRecord {
    pub fn new(file: PackageFile) -> Self {
        Self {
            file,
            meta: Metadata::default(),
            primary_type: UNKNOWN_TYPE.to_string(),
            categories: Vec::new(),
            tags: Vec::new(),
            missing_deps: Vec::new(),
            is_duplicate: false,
            is_corrupt: false,
            has_thumbnail: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_enabled()
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

/// Everything one library scan produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub packages: Vec<PackageRecord>,
    pub tags: Vec<String>,
}
