use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::EmbedOptions;

/// Current journal file format version
const JOURNAL_VERSION: u32 = 1;

/// Journal filename, stored in the media root
pub const JOURNAL_FILENAME: &str = ".flickr-rebuild-journal.json";
const JOURNAL_TEMP_FILENAME: &str = ".flickr-rebuild-journal.tmp";

/// A file the backend updated successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub path: PathBuf,
    pub id: String,
}

/// Record of files already written by an unfinished embed run. Keyword tags
/// are appended, so rewriting a file twice would duplicate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub options_hash: String,
    pub updated: Vec<JournalEntry>,
}

impl Journal {
    pub fn new(options: &EmbedOptions) -> Self {
        Self {
            version: JOURNAL_VERSION,
            timestamp: Utc::now(),
            options_hash: compute_options_hash(options),
            updated: Vec::new(),
        }
    }

    pub fn load(dir: &Path) -> anyhow::Result<Option<Self>> {
        let path = dir.join(JOURNAL_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let journal = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(journal))
    }

    /// Write via a temp file and rename so a crash never leaves half a journal.
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let path = dir.join(JOURNAL_FILENAME);
        let temp_path = dir.join(JOURNAL_TEMP_FILENAME);

        let file = File::create(&temp_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    pub fn delete(dir: &Path) -> anyhow::Result<()> {
        let path = dir.join(JOURNAL_FILENAME);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// A journal only applies to a run with the same write-affecting options.
    pub fn is_compatible(&self, options: &EmbedOptions) -> bool {
        self.version == JOURNAL_VERSION && self.options_hash == compute_options_hash(options)
    }

    pub fn mark_updated(&mut self, path: &Path, id: &str) {
        self.updated.push(JournalEntry {
            path: path.to_path_buf(),
            id: id.to_string(),
        });
        self.timestamp = Utc::now();
    }

    pub fn updated_paths(&self) -> HashSet<PathBuf> {
        self.updated.iter().map(|e| e.path.clone()).collect()
    }
}

/// Hash of the options that change what gets written.
fn compute_options_hash(options: &EmbedOptions) -> String {
    let mut hasher = Sha256::new();
    let f = &options.fields;
    for flag in [f.title, f.description, f.tags, f.geo, f.capture_date, options.all_copies] {
        hasher.update(if flag { b"1" } else { b"0" });
    }
    hasher.update(format!("{:?}", options.kinds).as_bytes());
    hasher.update(options.media_root.to_string_lossy().as_bytes());
    for dir in &options.json_dirs {
        hasher.update(b"\0");
        hasher.update(dir.to_string_lossy().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Keeps the journal on disk in step with the backend. Keyword tags are
/// appended, so every successful write is persisted before the next one starts.
pub struct JournalSaver {
    journal: Journal,
    dir: PathBuf,
}

impl JournalSaver {
    pub fn new(journal: Journal, dir: PathBuf) -> Self {
        Self { journal, dir }
    }

    pub fn mark_updated(&mut self, path: &Path, id: &str) {
        self.journal.mark_updated(path, id);
        self.force_save();
    }

    pub fn force_save(&mut self) {
        if let Err(err) = self.journal.save(&self.dir) {
            log::warn!("Could not save journal in {}: {}", self.dir.display(), err);
        }
    }

    /// Run finished: the journal is no longer needed.
    pub fn mark_completed(self) -> anyhow::Result<()> {
        Journal::delete(&self.dir)
    }
}

/// Token for cooperative cancellation of a write run.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
