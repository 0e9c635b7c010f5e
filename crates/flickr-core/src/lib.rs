pub mod backend;
pub mod date;
pub mod error;
pub mod identifier;
pub mod journal;
pub mod media;
pub mod organize;
pub mod plan;
pub mod scan;
pub mod select;
pub mod sidecar;

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use backend::{BackendError, BackupPolicy, ExifTool, MetadataBackend};
pub use error::{CancelledError, ConfigError};
pub use journal::{CancellationToken, Journal, JournalSaver, JOURNAL_FILENAME};
pub use media::{KindFilter, MediaFile, MediaKind};
pub use organize::{OrganizeMode, OrganizeReport};
pub use plan::{FieldCategory, FieldSet, FieldWritePlan};
pub use sidecar::{LoadStats, RecordIndex, SidecarRecord};

/// Options for writing sidecar metadata into media files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedOptions {
    pub media_root: PathBuf,
    pub json_dirs: Vec<PathBuf>,
    pub fields: FieldSet,
    #[serde(default)]
    pub kinds: KindFilter,
    /// Write every file sharing an ID instead of only the best one
    #[serde(default)]
    pub all_copies: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Stop after this many files were updated
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub backup: BackupPolicy,
    /// Skip files recorded in a compatible journal
    #[serde(default)]
    pub resume: bool,
    /// Also set the file mtime to the capture date
    #[serde(default)]
    pub set_mtime: bool,
}

/// Options for reorganizing a media tree into `YYYY/MM` folders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub downloads: PathBuf,
    pub out: PathBuf,
    #[serde(default)]
    pub mode: OrganizeMode,
    /// Use an existing `exiftool -csv` report instead of running a scan
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Keep a copy of the generated report
    #[serde(default)]
    pub save_manifest: Option<PathBuf>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Run-time controls that are not part of the persisted options.
#[derive(Debug, Clone, Default)]
pub struct EmbedControl {
    pub cancel_token: Option<CancellationToken>,
}

impl EmbedControl {
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// A file the run gave up on, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbedReport {
    pub dry_run: bool,
    pub records: LoadStats,
    pub files_scanned: u64,
    /// Distinct IDs found in filenames
    pub ids_found: u64,
    /// Media files with no ID in their name
    pub skipped_no_id: u64,
    /// IDs with no sidecar record
    pub skipped_no_record: u64,
    /// Target files excluded by the kind filter
    pub skipped_kind: u64,
    /// Capture date requested but the record's date is missing or malformed
    pub skipped_no_date: u64,
    /// Target files for which no requested field had a value
    pub skipped_nothing_to_write: u64,
    /// Already updated according to the journal
    pub skipped_journal: u64,
    /// Updated files (in dry-run: files that would be updated)
    pub updated: u64,
    /// Per category, how many updated files received it
    pub fields_written: BTreeMap<FieldCategory, u64>,
    pub limit_reached: bool,
    pub failures: Vec<FileFailure>,
}

/// Value passed as `total` when the size of a stage is not known up front.
pub const UNKNOWN_TOTAL: u64 = 0;

/// Type alias for progress callback: (stage, current, total, message)
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms, plus the final step.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Cell<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    const INTERVAL: Duration = Duration::from_millis(200);

    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let start = Instant::now();
        Self {
            inner,
            last_emit: Cell::new(start.checked_sub(Self::INTERVAL).unwrap_or(start)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total != UNKNOWN_TOTAL && current + 1 >= total;
        if !is_done {
            if self.last_emit.get().elapsed() < Self::INTERVAL {
                return;
            }
            self.last_emit.set(Instant::now());
        }
        (self.inner)(stage, current, total, message);
    }
}

fn sort_key(file: &MediaFile) -> (String, PathBuf) {
    (file.path.to_string_lossy().to_lowercase(), file.path.clone())
}

/// Match media files to sidecar records and write the requested fields.
///
/// Stages run in order: load records, scan media, plan every file, then call
/// the backend once per planned file. Backend failures are recorded and the
/// run moves on. In dry-run the backend is never called and nothing is
/// written, but every count matches what a real run would report.
pub fn embed(
    options: &EmbedOptions,
    backend: &dyn MetadataBackend,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<EmbedReport> {
    embed_with_control(options, &EmbedControl::default(), backend, progress_callback)
}

/// Same as [`embed`], stopping between files once `control` is cancelled.
/// The journal is saved and kept so `resume` can pick up where the run stopped.
pub fn embed_with_control(
    options: &EmbedOptions,
    control: &EmbedControl,
    backend: &dyn MetadataBackend,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<EmbedReport> {
    let tp = ThrottledProgress::new(progress_callback);

    for dir in &options.json_dirs {
        ConfigError::require_dir("JSON dir", dir)?;
    }
    ConfigError::require_dir("media root", &options.media_root)?;

    let (index, records) = sidecar::load_records(&options.json_dirs, &tp)?;
    let scan = scan::scan_media(&options.media_root, &tp)?;

    let mut report = EmbedReport {
        dry_run: options.dry_run,
        records,
        files_scanned: scan.scanned,
        ids_found: scan.groups.len() as u64,
        skipped_no_id: scan.without_id,
        ..EmbedReport::default()
    };

    // Journal from an interrupted run
    let previous = if options.resume {
        match Journal::load(&options.media_root)? {
            Some(j) if j.is_compatible(options) => {
                log::info!("Resuming: {} file(s) already updated", j.updated.len());
                Some(j)
            }
            Some(_) => {
                log::warn!("Journal was written with different options, starting fresh");
                None
            }
            None => None,
        }
    } else {
        None
    };
    let already_done: HashSet<PathBuf> = previous
        .as_ref()
        .map(Journal::updated_paths)
        .unwrap_or_default();

    // Plan everything before touching any file
    let mut work: Vec<FieldWritePlan> = Vec::new();
    for (id, files) in &scan.groups {
        let Some(record) = index.get(id) else {
            report.skipped_no_record += 1;
            continue;
        };

        let targets: Vec<&MediaFile> = if options.all_copies {
            let mut all: Vec<&MediaFile> = files.iter().collect();
            select::sort_candidates(&mut all);
            all
        } else {
            select::pick_best(files).into_iter().collect()
        };

        for file in targets {
            if !options.kinds.allows(file.kind) {
                report.skipped_kind += 1;
                continue;
            }
            if options.fields.capture_date
                && record.date_taken.as_deref().and_then(date::to_embedded).is_none()
            {
                report.skipped_no_date += 1;
            }

            let plan = plan::plan_writes(record, file, &options.fields);
            if plan.is_empty() {
                report.skipped_nothing_to_write += 1;
                continue;
            }
            if already_done.contains(&file.path) {
                report.skipped_journal += 1;
                continue;
            }
            work.push(plan);
        }
    }
    work.sort_by_cached_key(|p| sort_key(&p.file));
    log::info!("Files to write: {}", work.len());

    let mut saver = if options.dry_run {
        None
    } else {
        let journal = previous.unwrap_or_else(|| Journal::new(options));
        Some(JournalSaver::new(journal, options.media_root.clone()))
    };

    let total = work.len() as u64;
    for (i, plan) in work.iter().enumerate() {
        if control.is_cancelled() {
            log::warn!("Cancelled after {} file(s); journal kept for resume", report.updated);
            if let Some(saver) = saver.as_mut() {
                saver.force_save();
            }
            return Err(CancelledError.into());
        }
        if let Some(limit) = options.limit {
            if report.updated >= limit as u64 {
                log::info!("Limit of {} reached", limit);
                report.limit_reached = true;
                break;
            }
        }
        tp.report("write", i as u64, total, "Writing metadata");

        let path = &plan.file.path;
        if options.dry_run {
            let categories: Vec<String> = plan.writes.keys().map(|c| format!("{:?}", c)).collect();
            log::info!("[DRY] {} {} {} <= {}", plan.file.kind.as_str(), plan.id, path.display(), categories.join(","));
        } else {
            if let Err(err) = backend.apply(path, &plan.tag_writes(), options.backup) {
                log::error!("Metadata write failed for {}: {}", path.display(), err);
                report.failures.push(FileFailure {
                    path: path.clone(),
                    message: err.to_string(),
                });
                continue;
            }
            if let Some(saver) = saver.as_mut() {
                saver.mark_updated(path, &plan.id);
            }
            if options.set_mtime {
                if let Some(ft) = plan.capture_date().and_then(date::to_file_time) {
                    if let Err(err) = filetime::set_file_mtime(path, ft) {
                        log::warn!("Could not set mtime on {}: {}", path.display(), err);
                    }
                }
            }
        }

        report.updated += 1;
        for category in plan.writes.keys() {
            *report.fields_written.entry(*category).or_default() += 1;
        }
    }

    // A limited run is resumable; only a full pass retires the journal
    if let Some(mut saver) = saver {
        if report.limit_reached {
            saver.force_save();
        } else {
            saver.mark_completed()?;
        }
    }

    Ok(report)
}

/// Sort a media tree into `<out>/<YYYY>/<MM>` using an ExifTool scan report.
pub fn organize(
    options: &OrganizeOptions,
    backend: &dyn MetadataBackend,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<OrganizeReport> {
    let tp = ThrottledProgress::new(progress_callback);

    ConfigError::require_dir("downloads root", &options.downloads)?;

    let manifest = match &options.manifest {
        Some(path) => {
            if !path.is_file() {
                return Err(ConfigError::MissingManifest(path.clone()).into());
            }
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            log::info!("Scanning {} with the metadata backend", options.downloads.display());
            backend.scan_manifest(&options.downloads)?
        }
    };

    if let Some(save) = &options.save_manifest {
        if !options.dry_run {
            fs::write(save, &manifest).with_context(|| format!("writing {}", save.display()))?;
            log::info!("Wrote manifest: {}", save.display());
        }
    }

    let rows = organize::parse_manifest(manifest.as_bytes())?;
    organize::organize_rows(&rows, &options.out, options.mode, options.dry_run, &tp)
}
