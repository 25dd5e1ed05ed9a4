//! Listing of the displayable items inside one package.
//!
//! Scenes, looks, presets, morphs and asset bundles are listed with the
//! preview image stored next to them (same path, image extension), encoded
//! as base64 so front ends can show it without touching the archive.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::{ArchiveIndex, IndexedEntry};
use crate::classify;
use crate::config::DEFAULT_THUMBNAIL_SIZE_LIMIT;
use crate::error::Result;
use crate::package::capitalize_first;

const PRESET_TYPE: &str = "Preset";

/// Custom folders whose presets are not named after the folder.
const RESERVED_FOLDERS: [&str; 4] = ["clothing", "hair", "assets", "atom"];

/// One displayable item inside a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageContent {
    /// Entry path as stored in the archive.
    pub file_path: String,
    pub file_name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_base64: Option<String>,
}

fn type_order(content_type: &str) -> u8 {
    match content_type {
        "Scene" => 0,
        "Look" => 1,
        "Clothing" => 2,
        "Hair" => 3,
        "Morph" => 4,
        "Skin" => 5,
        PRESET_TYPE => 6,
        "Script" => 7,
        "Asset" => 8,
        _ => 50,
    }
}

/// Display type of a normalized entry path, if it is a listable item.
fn content_type(path: &str) -> Option<String> {
    let ext = classify::extension(path)?;
    let label = match ext {
        "json" if path.contains("saves/scene/") => "Scene",
        "vap" if path.contains("saves/person/appearance/") => "Look",
        "vap" if path.contains("custom/clothing/") => "Clothing",
        "vap" if path.contains("custom/hair/") => "Hair",
        "vmi" | "vmb" if path.contains("custom/atom/person/morphs/") => "Morph",
        "assetbundle" if path.contains("custom/assets/") => "Asset",
        "vap" => return preset_type(path),
        _ => return None,
    };
    Some(label.to_string())
}

fn preset_type(path: &str) -> Option<String> {
    let mut segments = path.split('/');
    segments.by_ref().find(|segment| *segment == "custom")?;

    match segments.next() {
        Some(folder) if !folder.is_empty() && !RESERVED_FOLDERS.contains(&folder) => {
            Some(capitalize_first(folder))
        }
        _ => Some(PRESET_TYPE.to_string()),
    }
}

fn file_name(raw_name: &str) -> &str {
    raw_name.rsplit(['/', '\\']).next().unwrap_or(raw_name)
}

/// List the displayable items of one archive, in display order.
pub fn package_contents(path: &Path) -> Result<Vec<PackageContent>> {
    let mut archive = ArchiveIndex::open(path)?;
    let entries = std::mem::take(&mut archive.entries);

    let previews: HashMap<&str, &IndexedEntry> = entries
        .iter()
        .filter(|entry| classify::is_image(&entry.name))
        .map(|entry| (classify::stem(&entry.name), entry))
        .collect();

    let mut contents = Vec::new();
    for entry in &entries {
        let Some(content_type) = content_type(&entry.name) else {
            continue;
        };

        let thumbnail_base64 = match previews.get(classify::stem(&entry.name)) {
            Some(preview) => match archive.read(preview.index, DEFAULT_THUMBNAIL_SIZE_LIMIT) {
                Ok(bytes) => bytes.map(|bytes| STANDARD.encode(bytes)),
                Err(e) => {
                    debug!(archive = ?path, entry = %preview.raw_name, error = %e, "Failed to read preview");
                    None
                }
            },
            None => None,
        };

        contents.push(PackageContent {
            file_path: entry.raw_name.clone(),
            file_name: file_name(&entry.raw_name).to_string(),
            content_type,
            size: entry.size,
            thumbnail_base64,
        });
    }

    contents.sort_by(|a, b| {
        type_order(&a.content_type)
            .cmp(&type_order(&b.content_type))
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    Ok(contents)
}
