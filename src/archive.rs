//! Archive metadata parser.
//!
//! Opens one package (a zip container), reads its manifest, detects content
//! categories from the entry layout, aggregates tags from `.vam` items and
//! selects a preview image.
//!
//! # Architecture
//!
//! The archive directory is read once into an entry index (normalized names
//! and sizes, no decompression). Classification and thumbnail ranking work on
//! that index; only the manifest, `.vam` items and the winning preview are
//! ever decompressed, each capped by [`ParseLimits`].

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::debug;
use zip::ZipArchive;

use crate::classify::{self, classify_entry, ContentPriority};
use crate::config::{
    DEFAULT_MANIFEST_SIZE_LIMIT, DEFAULT_TAG_ENTRY_SIZE_LIMIT, DEFAULT_THUMBNAIL_SIZE_LIMIT,
};
use crate::encoding::decode_text;
use crate::error::{LibraryError, Result};
use crate::package::{split_tag_list, ContentCategory, Metadata};
use crate::thumbnail::{ImageEntry, ThumbnailPicker};

const MANIFEST_NAMES: [&str; 2] = ["meta.json", "core/meta.json"];

/// Largest buffer reserved up front from a size declared in the archive.
const MAX_PREALLOCATION: u64 = 1024 * 1024;

/// Upper bounds on how many decompressed bytes one entry may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub manifest: u64,
    pub tag_entry: u64,
    pub thumbnail: u64,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            manifest: DEFAULT_MANIFEST_SIZE_LIMIT,
            tag_entry: DEFAULT_TAG_ENTRY_SIZE_LIMIT,
            thumbnail: DEFAULT_THUMBNAIL_SIZE_LIMIT,
        }
    }
}

/// The selected preview image of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// Entry name as stored in the archive.
    pub entry_name: String,
    pub bytes: Vec<u8>,
}

/// Everything the parser extracts from one archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArchive {
    pub metadata: Metadata,
    pub thumbnail: Option<Thumbnail>,
    /// Detected categories, sorted by name.
    pub categories: Vec<ContentCategory>,
}

/// One file entry of an archive directory.
#[derive(Debug, Clone)]
pub(crate) struct IndexedEntry {
    pub index: usize,
    pub raw_name: String,
    /// Lower-case, forward slashes.
    pub name: String,
    pub size: u64,
}

/// An opened archive plus its file entries.
pub(crate) struct ArchiveIndex {
    archive: ZipArchive<File>,
    pub entries: Vec<IndexedEntry>,
}

impl ArchiveIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| LibraryError::access(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| LibraryError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = match archive.by_index_raw(index) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(archive = ?path, index, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            entries.push(IndexedEntry {
                index,
                raw_name: entry.name().to_string(),
                name: classify::normalize_entry_name(entry.name()),
                size: entry.size(),
            });
        }

        Ok(Self { archive, entries })
    }

    /// Decompress one entry, or `None` when it is larger than `limit`.
    pub fn read(&mut self, index: usize, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
        let entry = self.archive.by_index(index).map_err(std::io::Error::other)?;
        if entry.size() > limit {
            return Ok(None);
        }

        let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
        entry.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > limit {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Read an entry and decode it as a JSON document.
    pub fn read_json(&mut self, index: usize, limit: u64) -> Option<Value> {
        let bytes = match self.read(index, limit) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(index, limit, "Entry exceeds size limit");
                return None;
            }
            Err(e) => {
                debug!(index, error = %e, "Failed to read entry");
                return None;
            }
        };

        match serde_json::from_str(&decode_text(&bytes)) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(index, error = %e, "Entry is not valid JSON");
                None
            }
        }
    }
}

/// Parse one package archive.
pub fn parse(path: &Path, limits: &ParseLimits) -> Result<ParsedArchive> {
    let mut archive = ArchiveIndex::open(path)?;
    let entries = std::mem::take(&mut archive.entries);

    let mut labels = BTreeSet::new();
    let mut content_stems: HashMap<&str, ContentPriority> = HashMap::new();
    let mut metadata: Option<Metadata> = None;
    let mut discovered_tags = BTreeSet::new();

    for entry in &entries {
        let class = classify_entry(&entry.name);
        if let Some(category) = class.category {
            labels.insert(category.as_str().to_string());
        }
        if let Some(priority) = class.content {
            let slot = content_stems
                .entry(classify::stem(&entry.name))
                .or_insert(priority);
            *slot = (*slot).max(priority);
        }

        if metadata.is_none() && MANIFEST_NAMES.contains(&entry.name.as_str()) {
            match archive.read_json(entry.index, limits.manifest) {
                Some(doc) => metadata = Some(Metadata::from_manifest(&doc)),
                None => debug!(archive = ?path, entry = %entry.raw_name, "Unusable manifest"),
            }
        }

        if classify::extension(&entry.name) == Some("vam") {
            let tags = archive
                .read_json(entry.index, limits.tag_entry)
                .and_then(|item| item.get("tags").and_then(Value::as_str).map(split_tag_list));
            discovered_tags.extend(tags.into_iter().flatten());
        }
    }

    let mut metadata = metadata.unwrap_or_default();
    metadata.merge_tags(discovered_tags);

    let thumbnail = select_thumbnail(&mut archive, &entries, &content_stems, &metadata, limits);

    Ok(ParsedArchive {
        metadata,
        thumbnail,
        categories: labels
            .iter()
            .map(|label| ContentCategory::from_label(label))
            .collect(),
    })
}

fn select_thumbnail(
    archive: &mut ArchiveIndex,
    entries: &[IndexedEntry],
    content_stems: &HashMap<&str, ContentPriority>,
    metadata: &Metadata,
    limits: &ParseLimits,
) -> Option<Thumbnail> {
    let explicit = metadata
        .image_url
        .as_deref()
        .map(classify::normalize_entry_name);

    let mut picker = ThumbnailPicker::new();
    for (position, entry) in entries.iter().enumerate() {
        let is_explicit = explicit.as_deref() == Some(entry.name.as_str());
        if !is_explicit && !classify::is_image(&entry.name) {
            continue;
        }
        picker.offer(&ImageEntry {
            path: &entry.name,
            size: entry.size,
            index: position,
            sibling: content_stems.get(classify::stem(&entry.name)).copied(),
            explicit: is_explicit,
        });
    }

    let winner = &entries[picker.pick()?];
    match archive.read(winner.index, limits.thumbnail) {
        Ok(Some(bytes)) => Some(Thumbnail {
            entry_name: winner.raw_name.clone(),
            bytes,
        }),
        Ok(None) => {
            debug!(entry = %winner.raw_name, "Preview exceeds size limit");
            None
        }
        Err(e) => {
            debug!(entry = %winner.raw_name, error = %e, "Failed to read preview");
            None
        }
    }
}

/// Select and read the preview image of one archive.
pub fn read_thumbnail(path: &Path, limits: &ParseLimits) -> Result<Option<Thumbnail>> {
    Ok(parse(path, limits)?.thumbnail)
}
