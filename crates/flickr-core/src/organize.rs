use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::date;
use crate::media::MediaKind;
use crate::{FileFailure, ThrottledProgress};

/// One row of the `exiftool -csv` scan report. ExifTool leaves out columns no
/// file has, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestRow {
    #[serde(rename = "Directory", default)]
    pub directory: Option<String>,
    #[serde(rename = "FileName", default)]
    pub file_name: Option<String>,
    #[serde(rename = "DateTimeOriginal", default)]
    pub date_time_original: Option<String>,
    #[serde(rename = "CreateDate", default)]
    pub create_date: Option<String>,
}

impl ManifestRow {
    pub fn source_path(&self) -> Option<PathBuf> {
        let dir = self.directory.as_deref().filter(|s| !s.is_empty())?;
        let name = self.file_name.as_deref().filter(|s| !s.is_empty())?;
        Some(Path::new(dir).join(name))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizeMode {
    #[default]
    Copy,
    Move,
}

impl OrganizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizeMode::Copy => "copy",
            OrganizeMode::Move => "move",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub source: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeReport {
    pub dry_run: bool,
    pub rows: u64,
    /// Files copied or moved (in dry-run: that would be)
    pub processed: u64,
    /// Of those, how many needed a `_N` suffix
    pub renamed: u64,
    pub skipped_no_date: u64,
    /// Rows without Directory or FileName
    pub skipped_invalid: u64,
    /// Rows for non-photo/video files
    pub ignored: u64,
    pub placements: Vec<Placement>,
    pub failures: Vec<FileFailure>,
}

/// Parse a manifest CSV. Rows that fail to deserialize are logged and kept as
/// empty rows so they show up as invalid in the report.
pub fn parse_manifest<R: Read>(reader: R) -> anyhow::Result<Vec<ManifestRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for (i, row) in csv_reader.deserialize::<ManifestRow>().enumerate() {
        match row {
            Ok(r) => rows.push(r),
            Err(err) => {
                log::warn!("Manifest row {}: {}", i + 1, err);
                rows.push(ManifestRow::default());
            }
        }
    }
    Ok(rows)
}

/// Best date for bucketing: photos prefer DateTimeOriginal, videos prefer
/// CreateDate; each falls back to the other.
pub fn pick_manifest_date(row: &ManifestRow, kind: MediaKind) -> Option<&str> {
    let dto = row.date_time_original.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let cd = row.create_date.as_deref().map(str::trim).filter(|s| !s.is_empty());
    match kind {
        MediaKind::Photo => dto.or(cd),
        MediaKind::Video => cd.or(dto),
    }
}

pub fn bucket_dir(out_root: &Path, year: &str, month: &str) -> PathBuf {
    out_root.join(year).join(month)
}

/// Pick a destination in `dir` that is neither on disk nor already taken by
/// this run: `name.ext`, then `name_1.ext`, `name_2.ext`, ...
pub fn resolve_destination(dir: &Path, file_name: &str, reserved: &HashSet<PathBuf>) -> PathBuf {
    let is_free = |p: &Path| !reserved.contains(p) && !p.exists();

    let base = dir.join(file_name);
    if is_free(&base) {
        return base;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let ext = name.extension().and_then(|s| s.to_str()).unwrap_or("");

    let mut counter = 1u64;
    loop {
        let new_name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = dir.join(new_name);
        if is_free(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Copy keeping the source timestamps.
fn copy_preserving_times(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest)?;
    let meta = fs::metadata(src)?;
    let atime = filetime::FileTime::from_last_access_time(&meta);
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(dest, atime, mtime)
}

fn transfer(src: &Path, dest: &Path, mode: OrganizeMode) -> io::Result<()> {
    match mode {
        OrganizeMode::Copy => copy_preserving_times(src, dest),
        OrganizeMode::Move => {
            if fs::rename(src, dest).is_ok() {
                return Ok(());
            }
            // Different filesystem
            copy_preserving_times(src, dest)?;
            fs::remove_file(src)
        }
    }
}

/// Place every manifest row into `<out_root>/<YYYY>/<MM>`.
///
/// In dry-run nothing is created, copied or moved; reserved destinations are
/// tracked in memory so previewed names match a real run.
pub fn organize_rows(
    rows: &[ManifestRow],
    out_root: &Path,
    mode: OrganizeMode,
    dry_run: bool,
    progress: &ThrottledProgress,
) -> anyhow::Result<OrganizeReport> {
    let mut report = OrganizeReport {
        dry_run,
        rows: rows.len() as u64,
        ..OrganizeReport::default()
    };
    let mut reserved: HashSet<PathBuf> = HashSet::new();
    let mut created_dirs: HashSet<PathBuf> = HashSet::new();
    let total = rows.len() as u64;

    if !dry_run {
        fs::create_dir_all(out_root)?;
    }

    for (i, row) in rows.iter().enumerate() {
        progress.report("organize", i as u64, total, "Organizing by month");

        let Some(src) = row.source_path() else {
            report.skipped_invalid += 1;
            continue;
        };
        let Some(kind) = MediaKind::from_path(&src) else {
            report.ignored += 1;
            continue;
        };
        let Some((year, month)) = pick_manifest_date(row, kind).and_then(date::year_month) else {
            log::debug!("No usable date for {}", src.display());
            report.skipped_no_date += 1;
            continue;
        };
        let Some(file_name) = src.file_name().and_then(|n| n.to_str()) else {
            report.skipped_invalid += 1;
            continue;
        };

        let dest_dir = bucket_dir(out_root, &year, &month);
        let dest = resolve_destination(&dest_dir, file_name, &reserved);
        let renamed = dest.file_name().and_then(|n| n.to_str()) != Some(file_name);

        if dry_run {
            log::info!("[DRY] {} {} -> {}", mode.as_str(), src.display(), dest.display());
        } else {
            if !created_dirs.contains(&dest_dir) {
                fs::create_dir_all(&dest_dir)?;
                created_dirs.insert(dest_dir.clone());
            }
            if let Err(err) = transfer(&src, &dest, mode) {
                log::error!("{} failed for {}: {}", mode.as_str(), src.display(), err);
                report.failures.push(FileFailure {
                    path: src,
                    message: err.to_string(),
                });
                continue;
            }
        }

        reserved.insert(dest.clone());
        report.processed += 1;
        if renamed {
            report.renamed += 1;
        }
        report.placements.push(Placement { source: src, dest });
    }

    Ok(report)
}
