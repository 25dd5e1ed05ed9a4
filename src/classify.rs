//! Content classification of archive entries.
//!
//! Entry paths are normalized (lower-case, forward slashes) and matched
//! against a fixed prefix table. A match yields the entry's category and,
//! for a closed list of extensions per category, marks the entry as
//! content-bearing with a priority used by thumbnail selection.

use crate::package::{capitalize_first, ContentCategory};

/// How strongly a content-bearing entry represents its package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentPriority {
    Low,
    Medium,
    High,
}

/// Classification of a single archive entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryClass {
    pub category: Option<ContentCategory>,
    pub content: Option<ContentPriority>,
}

struct Rule {
    prefix: &'static str,
    category: &'static str,
    /// When set, entries with another extension are not classified at all.
    required_ext: Option<&'static str>,
    content_exts: &'static [&'static str],
    priority: ContentPriority,
}

const RULES: &[Rule] = &[
    Rule {
        prefix: "saves/scene/",
        category: "Scene",
        required_ext: Some("json"),
        content_exts: &["json"],
        priority: ContentPriority::High,
    },
    Rule {
        prefix: "saves/person/appearance/",
        category: "Look",
        required_ext: Some("vap"),
        content_exts: &["vap"],
        priority: ContentPriority::High,
    },
    Rule {
        prefix: "custom/clothing/",
        category: "Clothing",
        required_ext: None,
        content_exts: &["vam", "vap", "json"],
        priority: ContentPriority::Medium,
    },
    Rule {
        prefix: "custom/hair/",
        category: "Hair",
        required_ext: None,
        content_exts: &["vam", "vap", "json"],
        priority: ContentPriority::Medium,
    },
    Rule {
        prefix: "custom/atom/person/morphs/",
        category: "Morph",
        required_ext: None,
        content_exts: &["vmi", "vmb"],
        priority: ContentPriority::Low,
    },
    Rule {
        prefix: "custom/atom/person/textures/",
        category: "Skin",
        required_ext: None,
        content_exts: &[],
        priority: ContentPriority::Low,
    },
    Rule {
        prefix: "custom/scripts/",
        category: "Script",
        required_ext: None,
        content_exts: &["cs", "cslist"],
        priority: ContentPriority::Low,
    },
    Rule {
        prefix: "custom/assets/",
        category: "Asset",
        required_ext: None,
        content_exts: &["assetbundle", "scene"],
        priority: ContentPriority::Low,
    },
];

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png"];

/// Lower-case an entry name and use forward slashes.
pub fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
        .trim_start_matches('/')
        .to_lowercase()
}

/// Extension of the last path segment, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext)
}

/// The path without its extension, used to pair content with its preview.
pub fn stem(path: &str) -> &str {
    match extension(path) {
        Some(ext) => &path[..path.len() - ext.len() - 1],
        None => path,
    }
}

pub fn is_image(path: &str) -> bool {
    extension(path).is_some_and(|ext| IMAGE_EXTS.contains(&ext))
}

/// Images in these folders are usually texture dumps, not previews.
pub fn is_texture_path(path: &str) -> bool {
    let mut folders = path.split('/').rev().skip(1);
    folders.any(|folder| folder == "textures" || folder == "assets")
}

/// Folders whose images are plausible previews even without a sibling.
pub fn is_preview_path(path: &str) -> bool {
    ["saves/scene", "saves/person", "custom/clothing", "custom/hair"]
        .iter()
        .any(|prefix| path.contains(prefix))
}

/// Classify a normalized entry path.
pub fn classify_entry(path: &str) -> EntryClass {
    let ext = extension(path);

    if let Some(rule) = RULES.iter().find(|rule| path.starts_with(rule.prefix)) {
        if rule.required_ext.is_some_and(|required| ext != Some(required)) {
            return EntryClass::default();
        }

        let content = ext
            .filter(|ext| rule.content_exts.contains(ext))
            .map(|_| rule.priority);

        return EntryClass {
            category: Some(ContentCategory::from_label(rule.category)),
            content,
        };
    }

    if let Some(rest) = path.strip_prefix("custom/") {
        let mut parts = rest.split('/');
        if let (Some(folder), Some(_)) = (parts.next(), parts.next()) {
            if !folder.is_empty() {
                return EntryClass {
                    category: Some(ContentCategory::from_label(&capitalize_first(folder))),
                    content: None,
                };
            }
        }
    }

    EntryClass::default()
}
