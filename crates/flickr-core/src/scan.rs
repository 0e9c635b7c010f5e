use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::media::MediaFile;
use crate::ThrottledProgress;

/// Result of walking a media tree
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Flickr ID -> every media file carrying it
    pub groups: BTreeMap<String, Vec<MediaFile>>,
    /// Recognized photo/video files seen
    pub scanned: u64,
    /// Media files whose name holds no ID
    pub without_id: u64,
}

impl ScanResult {
    fn add(&mut self, file: MediaFile) {
        self.scanned += 1;
        match file.id.clone() {
            Some(id) => self.groups.entry(id).or_default().push(file),
            None => self.without_id += 1,
        }
    }
}

/// Recursively find photos and videos under `root` and group them by the ID
/// in their filename.
pub fn scan_media(root: &Path, progress: &ThrottledProgress) -> anyhow::Result<ScanResult> {
    ConfigError::require_dir("media root", root)?;

    let mut result = ScanResult::default();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file) = MediaFile::from_path(entry.into_path()) {
            result.add(file);
            progress.report("scan", result.scanned, crate::UNKNOWN_TOTAL, "Scanning media");
        }
    }

    log::info!(
        "Media files scanned (photos+videos): {} | matched IDs: {} | no ID: {}",
        result.scanned,
        result.groups.len(),
        result.without_id
    );
    Ok(result)
}
