use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::identifier;

const PHOTO_EXTS: &[&str] = &["jpg", "jpeg", "png", "heic", "tif", "tiff"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "m4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify a path by extension (case-insensitive). Anything outside the
    /// photo and video sets is not media.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

/// Which media kinds a write stage touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    Photos,
    Videos,
    #[default]
    Both,
}

impl KindFilter {
    pub fn allows(&self, kind: MediaKind) -> bool {
        match self {
            KindFilter::Photos => kind == MediaKind::Photo,
            KindFilter::Videos => kind == MediaKind::Video,
            KindFilter::Both => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Absolute or root-relative path as found by the scanner
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Flickr ID extracted from the filename, if any
    pub id: Option<String>,
}

impl MediaFile {
    /// Build a MediaFile, or None when the extension is not a media type.
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let kind = MediaKind::from_path(&path)?;
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(identifier::extract_id)
            .map(str::to_string);
        Some(Self { path, kind, id })
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}
