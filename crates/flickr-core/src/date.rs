use chrono::NaiveDateTime;

/// Length of `YYYY-MM-DD HH:MM:SS`
const DATETIME_LEN: usize = 19;

const EMBEDDED_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Convert a sidecar `date_taken` (`YYYY-MM-DD HH:MM:SS`) into the embedded
/// metadata form (`YYYY:MM:DD HH:MM:SS`).
///
/// The first 19 characters must have exactly that shape; anything after them
/// is dropped. No calendar validation is done, the text is carried over as-is.
pub fn to_embedded(sidecar: &str) -> Option<String> {
    let s = sidecar.trim();
    let bytes = s.as_bytes();
    if bytes.len() < DATETIME_LEN {
        return None;
    }

    for (i, &b) in bytes[..DATETIME_LEN].iter().enumerate() {
        let ok = match i {
            4 | 7 => b == b'-',
            10 => b == b' ',
            13 | 16 => b == b':',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return None;
        }
    }

    // All 19 bytes are ASCII here, so slicing is on char boundaries
    Some(format!("{}{}", s[..10].replace('-', ":"), &s[10..DATETIME_LEN]))
}

/// Extract the (`YYYY`, `MM`) bucket from an embedded-style date such as
/// `2015:06:03 14:22:10` or `2015:06:03 14:22:10+08:00`.
pub fn year_month(embedded: &str) -> Option<(String, String)> {
    let year = embedded.get(0..4)?;
    let month = embedded.get(5..7)?;
    if !year.bytes().all(|b| b.is_ascii_digit()) || !month.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((year.to_string(), month.to_string()))
}

/// Interpret an embedded date as local time and turn it into a file mtime.
/// Embedded dates carry no zone, same as EXIF.
pub fn to_file_time(embedded: &str) -> Option<filetime::FileTime> {
    let naive = NaiveDateTime::parse_from_str(embedded.get(..DATETIME_LEN)?, EMBEDDED_FORMAT).ok()?;
    let local = naive.and_local_timezone(chrono::Local).single()?;
    Some(filetime::FileTime::from_unix_time(local.timestamp(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_embedded() {
        assert_eq!(to_embedded("2015-06-03 14:22:10").as_deref(), Some("2015:06:03 14:22:10"));
        assert_eq!(to_embedded("  2015-06-03 14:22:10 ").as_deref(), Some("2015:06:03 14:22:10"));
        assert_eq!(to_embedded("2015-06-03 14:22:10.000").as_deref(), Some("2015:06:03 14:22:10"));
    }

    #[test]
    fn test_to_embedded_rejects_other_shapes() {
        assert_eq!(to_embedded("2015/06/03"), None);
        assert_eq!(to_embedded("2015-06-03"), None);
        assert_eq!(to_embedded("2015-06-03T14:22:10"), None);
        assert_eq!(to_embedded("2015:06:03 14:22:10"), None);
        assert_eq!(to_embedded("2015-06-03 14.22.10"), None);
        assert_eq!(to_embedded("20x5-06-03 14:22:10"), None);
        assert_eq!(to_embedded(""), None);
    }

    #[test]
    fn test_year_month() {
        assert_eq!(year_month("2015:06:03 14:22:10"), Some(("2015".into(), "06".into())));
        assert_eq!(year_month("2015:06:03 14:22:10+08:00"), Some(("2015".into(), "06".into())));
        assert_eq!(year_month("2015:6"), None);
        assert_eq!(year_month("0000:00:00 00:00:00"), Some(("0000".into(), "00".into())));
        assert_eq!(year_month("abcd:ef"), None);
        assert_eq!(year_month(""), None);
    }

    #[test]
    fn test_malformed_date_has_no_bucket() {
        let converted = to_embedded("2015/06/03");
        assert!(converted.is_none());
        assert!(converted.as_deref().and_then(year_month).is_none());
    }

    #[test]
    fn test_normalize_then_bucket_matches_sidecar_prefix() {
        for sidecar in ["2015-06-03 14:22:10", "1999-12-31 23:59:59", "2021-01-01 00:00:00"] {
            let embedded = to_embedded(sidecar).unwrap();
            let direct: String = sidecar[..7]
                .char_indices()
                .map(|(i, c)| if i == 4 { ':' } else { c })
                .collect();
            assert_eq!(year_month(&embedded), year_month(&direct));
        }
    }

    #[test]
    fn test_to_file_time() {
        assert!(to_file_time("2015:06:03 14:22:10").is_some());
        assert!(to_file_time("2015:13:03 14:22:10").is_none());
        assert!(to_file_time("garbage").is_none());
    }
}
