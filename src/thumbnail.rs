//! Preview image selection.
//!
//! Every image entry in an archive is turned into a [`ThumbnailCandidate`]
//! and the winner is picked by a single fold: highest rank, then largest
//! size, and on a full tie the entry seen first. Images that do not qualify
//! for any rank are only considered when nothing else does.

use crate::classify::{is_preview_path, is_texture_path, ContentPriority};

/// Strength of an image's claim to be the package preview; higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThumbnailRank {
    /// Any image outside texture and asset folders.
    Loose,
    /// An image inside a scene, person, clothing or hair folder.
    ContentPath,
    LowContent,
    MediumContent,
    HighContent,
    /// `package.jpg` / `package.png` at the archive root.
    PackageImage,
    /// The image named by the manifest's `imageUrl`.
    Explicit,
}

impl From<ContentPriority> for ThumbnailRank {
    fn from(priority: ContentPriority) -> Self {
        match priority {
            ContentPriority::Low => ThumbnailRank::LowContent,
            ContentPriority::Medium => ThumbnailRank::MediumContent,
            ContentPriority::High => ThumbnailRank::HighContent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailCandidate {
    pub rank: ThumbnailRank,
    pub size: u64,
    /// Position of the entry in the archive directory.
    pub index: usize,
}

/// Facts about one image entry needed to rank it.
#[derive(Debug, Clone, Copy)]
pub struct ImageEntry<'a> {
    /// Normalized entry path.
    pub path: &'a str,
    pub size: u64,
    pub index: usize,
    /// Priority of a content entry sharing this image's stem, if any.
    pub sibling: Option<ContentPriority>,
    pub explicit: bool,
}

/// Rank one image, or `None` when it only qualifies as a last resort.
pub fn rank_image(image: &ImageEntry<'_>) -> Option<ThumbnailRank> {
    if image.explicit {
        return Some(ThumbnailRank::Explicit);
    }
    if matches!(image.path, "package.jpg" | "package.png") {
        return Some(ThumbnailRank::PackageImage);
    }
    if let Some(priority) = image.sibling {
        return Some(priority.into());
    }
    if is_texture_path(image.path) {
        return None;
    }
    if is_preview_path(image.path) {
        return Some(ThumbnailRank::ContentPath);
    }
    Some(ThumbnailRank::Loose)
}

/// Accumulates candidates and keeps the current winner.
#[derive(Debug, Default)]
pub struct ThumbnailPicker {
    best: Option<ThumbnailCandidate>,
    largest: Option<(u64, usize)>,
}

impl ThumbnailPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, image: &ImageEntry<'_>) {
        if self.largest.map_or(true, |(size, _)| image.size > size) {
            self.largest = Some((image.size, image.index));
        }

        let Some(rank) = rank_image(image) else {
            return;
        };

        let candidate = ThumbnailCandidate {
            rank,
            size: image.size,
            index: image.index,
        };
        self.best = Some(match self.best {
            Some(best) if (best.rank, best.size) >= (rank, image.size) => best,
            _ => candidate,
        });
    }

    /// Index of the winning entry; the largest image when nothing ranked.
    pub fn pick(&self) -> Option<usize> {
        self.best
            .map(|best| best.index)
            .or(self.largest.map(|(_, index)| index))
    }

    pub fn best(&self) -> Option<ThumbnailCandidate> {
        self.best
    }
}
