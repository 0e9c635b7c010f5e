use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::date;
use crate::media::{MediaFile, MediaKind};
use crate::sidecar::SidecarRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Title,
    Description,
    Tags,
    Geo,
    CaptureDate,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 5] = [
        FieldCategory::Title,
        FieldCategory::Description,
        FieldCategory::Tags,
        FieldCategory::Geo,
        FieldCategory::CaptureDate,
    ];
}

/// Categories the user asked to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default)]
    pub title: bool,
    #[serde(default)]
    pub description: bool,
    #[serde(default)]
    pub tags: bool,
    #[serde(default)]
    pub geo: bool,
    #[serde(default)]
    pub capture_date: bool,
}

impl FieldSet {
    /// Title, description, tags and geo.
    pub fn descriptive() -> Self {
        Self {
            title: true,
            description: true,
            tags: true,
            geo: true,
            capture_date: false,
        }
    }

    pub fn dates_only() -> Self {
        Self {
            capture_date: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, category: FieldCategory) -> bool {
        match category {
            FieldCategory::Title => self.title,
            FieldCategory::Description => self.description,
            FieldCategory::Tags => self.tags,
            FieldCategory::Geo => self.geo,
            FieldCategory::CaptureDate => self.capture_date,
        }
    }
}

/// One tag assignment for the backend. `append` adds to a list tag instead of
/// replacing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWrite {
    pub tag: &'static str,
    pub value: String,
    pub append: bool,
}

impl TagWrite {
    fn set(tag: &'static str, value: &str) -> Self {
        Self {
            tag,
            value: value.to_string(),
            append: false,
        }
    }

    fn append(tag: &'static str, value: &str) -> Self {
        Self {
            tag,
            value: value.to_string(),
            append: true,
        }
    }
}

const PHOTO_DATE_TAGS: &[&str] = &["DateTimeOriginal", "CreateDate", "ModifyDate"];
const VIDEO_DATE_TAGS: &[&str] = &[
    "CreateDate",
    "ModifyDate",
    "TrackCreateDate",
    "TrackModifyDate",
    "MediaCreateDate",
    "MediaModifyDate",
];

/// The tag writes for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWritePlan {
    pub id: String,
    pub file: MediaFile,
    pub writes: BTreeMap<FieldCategory, Vec<TagWrite>>,
}

impl FieldWritePlan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// All writes in category order, as handed to the backend.
    pub fn tag_writes(&self) -> Vec<TagWrite> {
        self.writes.values().flatten().cloned().collect()
    }

    /// Embedded-form capture date, when the plan sets one.
    pub fn capture_date(&self) -> Option<&str> {
        self.writes
            .get(&FieldCategory::CaptureDate)?
            .first()
            .map(|w| w.value.as_str())
    }
}

/// Compute the writes for `file` from `record`.
///
/// A category is planned only when it is requested and the record has a
/// non-empty value for it. For capture dates "non-empty" means the sidecar
/// date converts to the embedded form. Nothing is ever cleared.
pub fn plan_writes(record: &SidecarRecord, file: &MediaFile, requested: &FieldSet) -> FieldWritePlan {
    let is_photo = file.kind == MediaKind::Photo;
    let mut writes: BTreeMap<FieldCategory, Vec<TagWrite>> = BTreeMap::new();

    if requested.title && !record.title.is_empty() {
        let mut w = vec![TagWrite::set("XMP:Title", &record.title)];
        if is_photo {
            w.push(TagWrite::set("IPTC:ObjectName", &record.title));
        }
        writes.insert(FieldCategory::Title, w);
    }

    if requested.description && !record.description.is_empty() {
        let mut w = vec![TagWrite::set("XMP:Description", &record.description)];
        if is_photo {
            w.push(TagWrite::set("IPTC:Caption-Abstract", &record.description));
        }
        writes.insert(FieldCategory::Description, w);
    }

    if requested.tags && !record.tags.is_empty() {
        let mut w = Vec::with_capacity(record.tags.len() * 2);
        for tag in &record.tags {
            w.push(TagWrite::append("XMP:Subject", tag));
            if is_photo {
                w.push(TagWrite::append("IPTC:Keywords", tag));
            }
        }
        writes.insert(FieldCategory::Tags, w);
    }

    if requested.geo {
        if let Some(geo) = &record.geo {
            let lat = geo.lat.to_string();
            let lon = geo.lon.to_string();
            let mut w = Vec::with_capacity(6);
            if is_photo {
                // EXIF stores the magnitude; the hemisphere lives in the Ref tags
                w.push(TagWrite::set("GPSLatitude", &lat));
                w.push(TagWrite::set("GPSLatitudeRef", if geo.lat < 0.0 { "S" } else { "N" }));
                w.push(TagWrite::set("GPSLongitude", &lon));
                w.push(TagWrite::set("GPSLongitudeRef", if geo.lon < 0.0 { "W" } else { "E" }));
            }
            w.push(TagWrite::set("XMP:GPSLatitude", &lat));
            w.push(TagWrite::set("XMP:GPSLongitude", &lon));
            writes.insert(FieldCategory::Geo, w);
        }
    }

    if requested.capture_date {
        if let Some(dt) = record.date_taken.as_deref().and_then(date::to_embedded) {
            let tags = if is_photo { PHOTO_DATE_TAGS } else { VIDEO_DATE_TAGS };
            let w = tags.iter().map(|&t| TagWrite::set(t, &dt)).collect();
            writes.insert(FieldCategory::CaptureDate, w);
        }
    }

    FieldWritePlan {
        id: record.id.clone(),
        file: file.clone(),
        writes,
    }
}
