use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use flickr_core::{
    BackupPolicy, CancellationToken, EmbedControl, EmbedOptions, EmbedReport, ExifTool, FieldSet,
    KindFilter, MetadataBackend, OrganizeMode, OrganizeOptions, OrganizeReport,
};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(
    name = "flickr-rebuild",
    version,
    about = "Rebuild a Flickr export: fix dates, embed sidecar metadata, organize into YYYY/MM"
)]
struct Cli {
    /// ExifTool executable used to read and write metadata
    #[arg(long, global = true, env = "FLICKR_REBUILD_EXIFTOOL", default_value = "exiftool")]
    exiftool: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed title/description/tags/geo (and optionally dates) from sidecar JSON
    Embed {
        #[command(flatten)]
        fields: FieldArgs,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Restore capture dates from sidecar JSON `date_taken`
    FixDates {
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Copy or move media into <out>/YYYY/MM using embedded dates
    Organize {
        #[command(flatten)]
        organize: OrganizeArgs,
        /// Use an existing `exiftool -csv` report instead of scanning
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Keep a copy of the generated scan report
        #[arg(long)]
        save_manifest: Option<PathBuf>,
    },
    /// Organize into --out, then fix dates and optionally embed metadata there
    Rebuild {
        #[command(flatten)]
        organize: OrganizeArgs,
        #[command(flatten)]
        stages: RebuildArgs,
    },
}

#[derive(Args)]
struct RebuildArgs {
    /// One or more Flickr JSON folders (part1, part2, ...)
    #[arg(long, required = true, num_args = 1..)]
    json: Vec<PathBuf>,
    /// Also embed title/description/tags/geo
    #[arg(long)]
    embed: bool,
    /// Do not keep *_original backups when writing metadata
    #[arg(long)]
    overwrite_original: bool,
    #[arg(long)]
    skip_organize: bool,
    /// Skip the photo and video date fix
    #[arg(long)]
    skip_fix: bool,
    #[arg(long)]
    skip_embed: bool,
}

#[derive(Args)]
#[group(required = true, multiple = true)]
struct FieldArgs {
    #[arg(long)]
    title: bool,
    #[arg(long)]
    description: bool,
    #[arg(long)]
    tags: bool,
    #[arg(long)]
    geo: bool,
    /// Capture date from `date_taken`
    #[arg(long)]
    dates: bool,
}

impl FieldArgs {
    fn to_field_set(&self) -> FieldSet {
        FieldSet {
            title: self.title,
            description: self.description,
            tags: self.tags,
            geo: self.geo,
            capture_date: self.dates,
        }
    }
}

#[derive(Args)]
struct WriteArgs {
    /// Root of the media tree to update
    #[arg(long)]
    media_root: PathBuf,

    /// One or more Flickr JSON folders; later folders win on duplicate IDs
    #[arg(long, required = true, num_args = 1..)]
    json: Vec<PathBuf>,

    /// Which media kinds to write
    #[arg(long, value_enum, default_value_t = KindsArg::Both)]
    kinds: KindsArg,

    /// Write every file sharing an ID, not only the best original
    #[arg(long)]
    all_copies: bool,

    /// Print what would be written without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Stop after N updated files (0 = no limit)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Do not keep *_original backups
    #[arg(long)]
    overwrite_original: bool,

    /// Skip files already updated by an interrupted run
    #[arg(long)]
    resume: bool,

    /// Also set file modification times to the capture date
    #[arg(long)]
    set_mtime: bool,
}

impl WriteArgs {
    fn to_options(&self, fields: FieldSet) -> EmbedOptions {
        EmbedOptions {
            media_root: self.media_root.clone(),
            json_dirs: self.json.clone(),
            fields,
            kinds: self.kinds.into(),
            all_copies: self.all_copies,
            dry_run: self.dry_run,
            limit: (self.limit > 0).then_some(self.limit),
            backup: backup_policy(self.overwrite_original),
            resume: self.resume,
            set_mtime: self.set_mtime,
        }
    }
}

#[derive(Args)]
struct OrganizeArgs {
    /// Root of the Flickr media export (data-download-* folders)
    #[arg(long)]
    downloads: PathBuf,

    /// Output folder (YYYY/MM structure)
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = ModeArg::Copy)]
    mode: ModeArg,

    /// Print the plan without creating, copying or moving anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindsArg {
    Photos,
    Videos,
    Both,
}

impl From<KindsArg> for KindFilter {
    fn from(k: KindsArg) -> Self {
        match k {
            KindsArg::Photos => KindFilter::Photos,
            KindsArg::Videos => KindFilter::Videos,
            KindsArg::Both => KindFilter::Both,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Copy,
    Move,
}

impl From<ModeArg> for OrganizeMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Copy => OrganizeMode::Copy,
            ModeArg::Move => OrganizeMode::Move,
        }
    }
}

fn backup_policy(overwrite_original: bool) -> BackupPolicy {
    if overwrite_original {
        BackupPolicy::OverwriteInPlace
    } else {
        BackupPolicy::CreateBackup
    }
}

/// Progress bar fed by the core's progress callback.
fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}

fn require_exiftool(tool: &ExifTool) -> anyhow::Result<()> {
    let version = tool.version().context(
        "exiftool is not installed or not found in PATH (set --exiftool or FLICKR_REBUILD_EXIFTOOL)",
    )?;
    log::info!("Found exiftool version: {}", version);
    Ok(())
}

/// Whether the command will call exiftool at all.
fn needs_exiftool(command: &Command) -> bool {
    match command {
        Command::Embed { write, .. } | Command::FixDates { write } => !write.dry_run,
        Command::Organize { manifest, .. } => manifest.is_none(),
        Command::Rebuild { organize, stages } => !stages.skip_organize || !organize.dry_run,
    }
}

fn run_embed(
    backend: &dyn MetadataBackend,
    control: &EmbedControl,
    options: &EmbedOptions,
) -> anyhow::Result<EmbedReport> {
    let bar = progress_bar();
    let report = flickr_core::embed_with_control(options, control, backend, &|stage, current, total, message| {
        bar.set_message(format!("[{}] {}", stage, message));
        bar.set_length(total);
        bar.set_position(current + 1);
    });
    bar.finish_and_clear();
    let report = report?;
    print_embed_report(&report);
    Ok(report)
}

fn run_organize(backend: &dyn MetadataBackend, options: &OrganizeOptions) -> anyhow::Result<OrganizeReport> {
    let bar = progress_bar();
    let report = flickr_core::organize(options, backend, &|stage, current, total, message| {
        bar.set_message(format!("[{}] {}", stage, message));
        bar.set_length(total);
        bar.set_position(current + 1);
    });
    bar.finish_and_clear();
    let report = report?;
    print_organize_report(&report, options.mode);
    Ok(report)
}

fn print_embed_report(r: &EmbedReport) {
    eprintln!(
        "[INFO] JSON files scanned: {} | mapped IDs: {} | unreadable: {} | overridden: {}",
        r.records.scanned, r.records.mapped, r.records.failed, r.records.replaced
    );
    eprintln!(
        "[INFO] Media files scanned: {} | IDs found: {}",
        r.files_scanned, r.ids_found
    );
    if r.dry_run {
        eprintln!("[DONE] Dry run listed: {}", r.updated);
    } else {
        eprintln!("[DONE] Updated: {}", r.updated);
    }
    for (category, count) in &r.fields_written {
        eprintln!("[INFO]   {:?}: {}", category, count);
    }
    eprintln!("[INFO] Skipped (no ID in filename): {}", r.skipped_no_id);
    eprintln!("[INFO] Skipped (no JSON match): {}", r.skipped_no_record);
    eprintln!("[INFO] Skipped (requested fields missing): {}", r.skipped_nothing_to_write);
    eprintln!("[INFO] Skipped (no usable date_taken): {}", r.skipped_no_date);
    if r.skipped_kind > 0 {
        eprintln!("[INFO] Skipped (kind filter): {}", r.skipped_kind);
    }
    if r.skipped_journal > 0 {
        eprintln!("[INFO] Skipped (already updated, journal): {}", r.skipped_journal);
    }
    if r.limit_reached {
        eprintln!("[INFO] Stopped at --limit");
    }
    eprintln!("[INFO] Failed: {}", r.failures.len());
    for f in &r.failures {
        eprintln!("[ERROR] {}: {}", f.path.display(), f.message);
    }
}

fn print_organize_report(r: &OrganizeReport, mode: OrganizeMode) {
    let verb = if r.dry_run { "DRY RUN" } else { mode.as_str() };
    eprintln!(
        "[DONE] {} complete. Files processed: {} (renamed on collision: {}). Skipped (no date): {}.",
        verb.to_uppercase(),
        r.processed,
        r.renamed,
        r.skipped_no_date
    );
    eprintln!(
        "[INFO] Manifest rows: {} | invalid: {} | not media: {}",
        r.rows, r.skipped_invalid, r.ignored
    );
    eprintln!("[INFO] Failed: {}", r.failures.len());
    for f in &r.failures {
        eprintln!("[ERROR] {}: {}", f.path.display(), f.message);
    }
}

/// Run organize, date fix and embed in order. The first failing stage aborts
/// the remaining ones.
fn run_rebuild(
    backend: &dyn MetadataBackend,
    control: &EmbedControl,
    organize: &OrganizeArgs,
    stages: &RebuildArgs,
) -> anyhow::Result<()> {
    flickr_core::ConfigError::require_dir("downloads path", &organize.downloads)?;
    for dir in &stages.json {
        flickr_core::ConfigError::require_dir("JSON dir", dir)?;
    }
    if !organize.dry_run {
        if let Some(parent) = organize.out.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    if !stages.skip_organize {
        eprintln!("=== Stage 1: Organizing into YYYY/MM ===");
        let options = OrganizeOptions {
            downloads: organize.downloads.clone(),
            out: organize.out.clone(),
            mode: organize.mode.into(),
            dry_run: organize.dry_run,
            ..OrganizeOptions::default()
        };
        run_organize(backend, &options).context("organize stage failed, aborting")?;
    }

    // A dry-run organize leaves --out empty, so preview the later stages on
    // the source tree instead
    let target: &Path = if organize.dry_run && !stages.skip_organize {
        &organize.downloads
    } else {
        &organize.out
    };
    let write_options = |fields: FieldSet| EmbedOptions {
        media_root: target.to_path_buf(),
        json_dirs: stages.json.clone(),
        fields,
        dry_run: organize.dry_run,
        backup: backup_policy(stages.overwrite_original),
        ..EmbedOptions::default()
    };

    if !stages.skip_fix {
        eprintln!("=== Stage 2: Fixing photo and video dates ===");
        run_embed(backend, control, &write_options(FieldSet::dates_only()))
            .context("date fix stage failed, aborting")?;
    }

    if stages.embed && !stages.skip_embed {
        eprintln!("=== Stage 3: Embedding title/description/tags/geo ===");
        run_embed(backend, control, &write_options(FieldSet::descriptive()))
            .context("embed stage failed, aborting")?;
    }

    eprintln!("[SUCCESS] Archive rebuild complete.");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let tool = ExifTool::new(&cli.exiftool);
    if needs_exiftool(&cli.command) {
        require_exiftool(&tool)?;
    }

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupted, stopping after the current file");
            token.cancel();
        })
        .context("installing the Ctrl-C handler")?;
    }
    let control = EmbedControl::default().with_cancel_token(token);
    let t_total = std::time::Instant::now();

    match &cli.command {
        Command::Embed { fields, write } => {
            run_embed(&tool, &control, &write.to_options(fields.to_field_set()))?;
        }
        Command::FixDates { write } => {
            run_embed(&tool, &control, &write.to_options(FieldSet::dates_only()))?;
        }
        Command::Organize {
            organize,
            manifest,
            save_manifest,
        } => {
            let options = OrganizeOptions {
                downloads: organize.downloads.clone(),
                out: organize.out.clone(),
                mode: organize.mode.into(),
                manifest: manifest.clone(),
                save_manifest: save_manifest.clone(),
                dry_run: organize.dry_run,
            };
            run_organize(&tool, &options)?;
        }
        Command::Rebuild { organize, stages } => {
            run_rebuild(&tool, &control, organize, stages)?;
        }
    }

    eprintln!("Total: {:.2}s", t_total.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use flickr_core::plan::TagWrite;
    use flickr_core::{BackendError, JOURNAL_FILENAME};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// Serves a canned manifest (or fails the scan) and records writes.
    struct FakeExifTool {
        manifest: Option<String>,
        applied: RefCell<Vec<PathBuf>>,
    }

    impl MetadataBackend for FakeExifTool {
        fn apply(&self, path: &Path, _writes: &[TagWrite], _backup: BackupPolicy) -> Result<(), BackendError> {
            self.applied.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn scan_manifest(&self, _root: &Path) -> Result<String, BackendError> {
            self.manifest.clone().ok_or_else(|| BackendError::Failed {
                program: "exiftool".into(),
                status: "exit status: 1".into(),
                stderr: "Error: scan failed".into(),
            })
        }
    }

    /// downloads/ with one dated photo, json/ with its record, out/ not created yet.
    fn export_fixture() -> (TempDir, OrganizeArgs, RebuildArgs) {
        let tmp = tempdir().unwrap();
        let downloads = tmp.path().join("downloads");
        let json = tmp.path().join("json");
        fs::create_dir_all(&downloads).unwrap();
        fs::create_dir_all(&json).unwrap();
        fs::write(downloads.join("sunset_12345678901.jpg"), b"data").unwrap();
        fs::write(
            json.join("photo_12345678901.json"),
            r#"{"id": "12345678901", "name": "Sunset", "date_taken": "2015-06-03 14:22:10"}"#,
        )
        .unwrap();

        let organize = OrganizeArgs {
            downloads,
            out: tmp.path().join("out"),
            mode: ModeArg::Copy,
            dry_run: false,
        };
        let stages = RebuildArgs {
            json: vec![json],
            embed: true,
            overwrite_original: false,
            skip_organize: false,
            skip_fix: false,
            skip_embed: false,
        };
        (tmp, organize, stages)
    }

    fn manifest_for(organize: &OrganizeArgs) -> String {
        format!(
            "SourceFile,Directory,FileName,DateTimeOriginal\n\
             x,{},sunset_12345678901.jpg,2015:06:03 14:22:10\n",
            organize.downloads.display()
        )
    }

    #[test]
    fn test_rebuild_stops_after_failed_organize() {
        let (_tmp, organize, stages) = export_fixture();
        let backend = FakeExifTool {
            manifest: None,
            applied: RefCell::new(Vec::new()),
        };

        let err = run_rebuild(&backend, &EmbedControl::default(), &organize, &stages).unwrap_err();
        assert!(format!("{:#}", err).contains("organize stage failed"));
        assert!(backend.applied.borrow().is_empty());
        assert!(!organize.out.exists());
    }

    #[test]
    fn test_rebuild_dry_run_writes_nothing() {
        let (_tmp, mut organize, stages) = export_fixture();
        organize.dry_run = true;
        let backend = FakeExifTool {
            manifest: Some(manifest_for(&organize)),
            applied: RefCell::new(Vec::new()),
        };

        run_rebuild(&backend, &EmbedControl::default(), &organize, &stages).unwrap();
        assert!(backend.applied.borrow().is_empty());
        assert!(!organize.out.exists());
        assert!(!organize.downloads.join(JOURNAL_FILENAME).exists());
    }

    #[test]
    fn test_rebuild_runs_stages_on_out() {
        let (_tmp, organize, stages) = export_fixture();
        let backend = FakeExifTool {
            manifest: Some(manifest_for(&organize)),
            applied: RefCell::new(Vec::new()),
        };

        run_rebuild(&backend, &EmbedControl::default(), &organize, &stages).unwrap();
        let placed = organize.out.join("2015/06/sunset_12345678901.jpg");
        assert!(placed.exists());
        // Date fix, then embed, both on the organized copy
        assert_eq!(*backend.applied.borrow(), vec![placed.clone(), placed]);
    }

    #[test]
    fn test_exiftool_only_when_needed() {
        let cli = Cli::try_parse_from([
            "flickr-rebuild", "organize", "--downloads", "d", "--out", "o", "--manifest", "m.csv",
        ])
        .unwrap();
        assert!(!needs_exiftool(&cli.command));

        let cli = Cli::try_parse_from([
            "flickr-rebuild", "rebuild", "--downloads", "d", "--json", "j", "--out", "o", "--dry-run",
        ])
        .unwrap();
        assert!(needs_exiftool(&cli.command));
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_embed_requires_a_field() {
        let err = Cli::try_parse_from(["flickr-rebuild", "embed", "--media-root", "m", "--json", "j"]);
        assert!(err.is_err());

        let cli = Cli::try_parse_from([
            "flickr-rebuild", "embed", "--media-root", "m", "--json", "j1", "j2", "--title", "--geo",
            "--limit", "5", "--overwrite-original",
        ])
        .unwrap();
        let Command::Embed { fields, write } = cli.command else {
            panic!("expected embed");
        };
        let options = write.to_options(fields.to_field_set());
        assert!(options.fields.title && options.fields.geo && !options.fields.tags);
        assert_eq!(options.json_dirs.len(), 2);
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.backup, BackupPolicy::OverwriteInPlace);
    }

    #[test]
    fn test_fix_dates_defaults() {
        let cli = Cli::try_parse_from(["flickr-rebuild", "fix-dates", "--media-root", "m", "--json", "j"]).unwrap();
        let Command::FixDates { write } = cli.command else {
            panic!("expected fix-dates");
        };
        let options = write.to_options(FieldSet::dates_only());
        assert_eq!(options.limit, None);
        assert_eq!(options.kinds, KindFilter::Both);
        assert_eq!(options.backup, BackupPolicy::CreateBackup);
        assert!(options.fields.capture_date && !options.fields.title);
    }
}
