use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::ThrottledProgress;

/// Sidecar files are `photo_<id>.json`; other JSON in the export (albums,
/// account data) is ignored.
const RECORD_PREFIX: &str = "photo_";
const RECORD_SUFFIX: &str = ".json";

/// Keys probed, in order, when a tag is an object instead of a string
const TAG_KEYS: &[&str] = &["raw", "tag", "name", "text", "value"];
const LAT_KEYS: &[&str] = &["latitude", "lat"];
const LON_KEYS: &[&str] = &["longitude", "lon", "lng"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// One Flickr photo/video record in canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub geo: Option<GeoPoint>,
    /// `YYYY-MM-DD HH:MM:SS` as exported; validated later by `date::to_embedded`
    pub date_taken: Option<String>,
}

// Raw shapes as they appear on disk. Exports disagree on how tags and geo are
// laid out, so those fields are unions resolved in `SidecarRecord::from_raw`.

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<RawTags>,
    #[serde(default)]
    geo: Option<RawGeo>,
    #[serde(default)]
    date_taken: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<RawTag>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTag {
    Text(String),
    Object(Map<String, Value>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGeo {
    Object(Map<String, Value>),
    List(Vec<Value>),
    Other(Value),
}

impl SidecarRecord {
    /// Parse one sidecar file. Returns Ok(None) for well-formed JSON that has
    /// no usable id.
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Option<Self>> {
        // Only objects are records; a derived Deserialize would also take arrays
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("sidecar is not a JSON object"));
        }
        let raw: RawRecord = serde_json::from_value(value)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawRecord) -> Option<Self> {
        let id = match raw.id? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if id.is_empty() {
            return None;
        }

        let tags = match raw.tags {
            Some(RawTags::List(items)) => normalize_tags(items),
            Some(RawTags::Other(_)) | None => Vec::new(),
        };

        let geo = match raw.geo {
            Some(RawGeo::Object(obj)) => geo_from_object(&obj),
            Some(RawGeo::List(items)) => match items.first() {
                Some(Value::Object(obj)) => geo_from_object(obj),
                _ => None,
            },
            Some(RawGeo::Other(_)) | None => None,
        };

        let date_taken = raw
            .date_taken
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            id,
            title: raw.name.unwrap_or_default().trim().to_string(),
            description: raw.description.unwrap_or_default().trim().to_string(),
            tags,
            geo,
            date_taken,
        })
    }
}

/// Trim, drop empties, dedupe case-insensitively keeping first spelling.
fn normalize_tags(items: Vec<RawTag>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for item in items {
        let text = match item {
            RawTag::Text(s) => Some(s),
            RawTag::Object(obj) => TAG_KEYS.iter().find_map(|k| {
                obj.get(*k)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
            }),
            RawTag::Other(_) => None,
        };
        let Some(text) = text else { continue };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if seen.insert(text.to_lowercase()) {
            tags.push(text.to_string());
        }
    }
    tags
}

fn geo_from_object(obj: &Map<String, Value>) -> Option<GeoPoint> {
    let lat = first_coordinate(obj, LAT_KEYS)?;
    let lon = first_coordinate(obj, LON_KEYS)?;
    Some(GeoPoint { lat, lon })
}

/// First key whose value is a number or a numeric string.
fn first_coordinate(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = match obj.get(*k)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        v.is_finite().then_some(v)
    })
}

/// Records keyed by Flickr ID.
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    records: HashMap<String, SidecarRecord>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&SidecarRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a record; returns true if it replaced one with the same id.
    pub fn insert(&mut self, record: SidecarRecord) -> bool {
        self.records.insert(record.id.clone(), record).is_some()
    }

    /// Merge `later` into `self`. On duplicate ids the record from `later`
    /// wins. Returns the number of replaced records.
    ///
    /// Callers merge directories in the order given by the user, so the last
    /// listed JSON directory has precedence.
    pub fn merge(&mut self, later: RecordIndex) -> usize {
        let mut replaced = 0;
        for (id, record) in later.records {
            if self.records.insert(id.clone(), record).is_some() {
                log::debug!("record {} replaced by a later JSON directory", id);
                replaced += 1;
            }
        }
        replaced
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// `photo_*.json` files found
    pub scanned: u64,
    /// Distinct ids in the merged index
    pub mapped: u64,
    /// Unreadable or malformed files
    pub failed: u64,
    /// Parsed files without a usable id
    pub without_id: u64,
    /// Records that overwrote an earlier record with the same id
    pub replaced: u64,
}

fn is_record_file(name: &str) -> bool {
    name.starts_with(RECORD_PREFIX) && name.ends_with(RECORD_SUFFIX)
}

fn find_record_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(is_record_file))
        .map(|e| e.into_path())
        .collect()
}

/// Load every sidecar record under `dirs`.
///
/// All directories must exist. Bad files are logged and counted, never fatal.
/// Directories are merged in order; on duplicate ids the later directory wins.
pub fn load_records(
    dirs: &[PathBuf],
    progress: &ThrottledProgress,
) -> anyhow::Result<(RecordIndex, LoadStats)> {
    for dir in dirs {
        ConfigError::require_dir("JSON dir", dir)?;
    }

    let per_dir: Vec<Vec<PathBuf>> = dirs.iter().map(|d| find_record_files(d)).collect();
    let total: u64 = per_dir.iter().map(|files| files.len() as u64).sum();

    let mut index = RecordIndex::new();
    let mut stats = LoadStats::default();

    for files in per_dir {
        let mut dir_index = RecordIndex::new();
        for path in files {
            progress.report("records", stats.scanned, total, "Reading sidecar JSON");
            stats.scanned += 1;

            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| SidecarRecord::parse(&bytes).map_err(|e| e.to_string()));
            match parsed {
                Ok(Some(record)) => {
                    if dir_index.insert(record) {
                        stats.replaced += 1;
                    }
                }
                Ok(None) => stats.without_id += 1,
                Err(err) => {
                    log::warn!("Failed to read {}: {}", path.display(), err);
                    stats.failed += 1;
                }
            }
        }
        stats.replaced += index.merge(dir_index) as u64;
    }

    stats.mapped = index.len() as u64;
    log::info!(
        "JSON files scanned: {} | mapped IDs: {}",
        stats.scanned,
        stats.mapped
    );
    if stats.replaced > 0 {
        log::info!(
            "{} record(s) overridden by duplicate ids (later JSON directory wins)",
            stats.replaced
        );
    }

    Ok((index, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(json: &str) -> Option<SidecarRecord> {
        SidecarRecord::parse(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_basic_record() {
        let r = parse(
            r#"{"id": "123456789012", "name": " Sunset ", "description": "",
                "date_taken": "2015-06-03 14:22:10"}"#,
        )
        .unwrap();
        assert_eq!(r.id, "123456789012");
        assert_eq!(r.title, "Sunset");
        assert_eq!(r.description, "");
        assert!(r.tags.is_empty());
        assert_eq!(r.geo, None);
        assert_eq!(r.date_taken.as_deref(), Some("2015-06-03 14:22:10"));
    }

    #[test]
    fn test_numeric_id_and_missing_id() {
        assert_eq!(parse(r#"{"id": 1234567890}"#).unwrap().id, "1234567890");
        assert!(parse(r#"{"name": "x"}"#).is_none());
        assert!(parse(r#"{"id": "  "}"#).is_none());
        assert!(parse(r#"{"id": null}"#).is_none());
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(SidecarRecord::parse(b"{not json").is_err());
        assert!(SidecarRecord::parse(br#"{"id": "1", "name": 5}"#).is_err());
        assert!(SidecarRecord::parse(br#"["123456789012", "Sunset"]"#).is_err());
        assert!(SidecarRecord::parse(b"\"123456789012\"").is_err());
    }

    #[test]
    fn test_tags_strings_and_objects() {
        let r = parse(
            r#"{"id": "1", "tags": [
                " Beach ", "", {"raw": "", "tag": "sunset"}, {"value": "BEACH"},
                {"name": "Travel"}, {"other": "ignored"}, 42, "travel"
            ]}"#,
        )
        .unwrap();
        assert_eq!(r.tags, vec!["Beach", "sunset", "Travel"]);
    }

    #[test]
    fn test_tags_not_a_list() {
        let r = parse(r#"{"id": "1", "tags": "a b c"}"#).unwrap();
        assert!(r.tags.is_empty());
    }

    #[test]
    fn test_geo_object_and_list() {
        let r = parse(r#"{"id": "1", "geo": {"latitude": "37.5", "lng": -122.25}}"#).unwrap();
        assert_eq!(r.geo, Some(GeoPoint { lat: 37.5, lon: -122.25 }));

        let r = parse(r#"{"id": "1", "geo": [{"lat": 1.0, "longitude": 2.0}, {"lat": 9}]}"#).unwrap();
        assert_eq!(r.geo, Some(GeoPoint { lat: 1.0, lon: 2.0 }));

        let r = parse(r#"{"id": "1", "geo": {"latitude": "", "lat": "4", "lon": "5"}}"#).unwrap();
        assert_eq!(r.geo, Some(GeoPoint { lat: 4.0, lon: 5.0 }));
    }

    #[test]
    fn test_partial_geo_is_dropped() {
        assert_eq!(parse(r#"{"id": "1", "geo": {"latitude": 10}}"#).unwrap().geo, None);
        assert_eq!(parse(r#"{"id": "1", "geo": []}"#).unwrap().geo, None);
        assert_eq!(parse(r#"{"id": "1", "geo": ["x"]}"#).unwrap().geo, None);
        assert_eq!(parse(r#"{"id": "1", "geo": {"lat": "n/a", "lon": 1}}"#).unwrap().geo, None);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut first = RecordIndex::new();
        first.insert(parse(r#"{"id": "1", "name": "old"}"#).unwrap());
        first.insert(parse(r#"{"id": "2", "name": "keep"}"#).unwrap());
        let mut later = RecordIndex::new();
        later.insert(parse(r#"{"id": "1", "name": "new"}"#).unwrap());

        assert_eq!(first.merge(later), 1);
        assert_eq!(first.get("1").unwrap().title, "new");
        assert_eq!(first.get("2").unwrap().title, "keep");
    }

    #[test]
    fn test_load_records_skips_bad_files() {
        let part1 = tempdir().unwrap();
        let part2 = tempdir().unwrap();
        fs::create_dir_all(part1.path().join("nested")).unwrap();
        fs::write(part1.path().join("photo_1.json"), r#"{"id": "1111111111", "name": "a"}"#).unwrap();
        fs::write(part1.path().join("nested/photo_2.json"), r#"{"id": "2222222222"}"#).unwrap();
        fs::write(part1.path().join("photo_bad.json"), "{{{").unwrap();
        fs::write(part1.path().join("album_1.json"), r#"{"id": "3333333333"}"#).unwrap();
        fs::write(part2.path().join("photo_1.json"), r#"{"id": "1111111111", "name": "b"}"#).unwrap();

        let cb = |_: &str, _: u64, _: u64, _: &str| {};
        let progress = ThrottledProgress::new(&cb);
        let (index, stats) = load_records(
            &[part1.path().to_path_buf(), part2.path().to_path_buf()],
            &progress,
        )
        .unwrap();

        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.mapped, 2);
        assert_eq!(index.get("1111111111").unwrap().title, "b");
        assert!(index.get("3333333333").is_none());
    }

    #[test]
    fn test_load_records_missing_dir() {
        let cb = |_: &str, _: u64, _: u64, _: &str| {};
        let progress = ThrottledProgress::new(&cb);
        let err = load_records(&[PathBuf::from("/definitely/not/here")], &progress).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
