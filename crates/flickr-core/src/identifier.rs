use regex::Regex;
use std::sync::LazyLock;

/// Maximal runs of ASCII digits. Length filtering happens afterwards so that a
/// 13-digit run is never cut down into a 12-digit match.
static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

const MIN_ID_LEN: usize = 10;
const MAX_ID_LEN: usize = 12;

/// Extract the Flickr photo ID from a filename.
///
/// Returns the last run of 10-12 digits that does not touch another digit.
/// 8-digit date stamps such as `20140603` never qualify. When a name holds
/// several candidates the last one wins, since exports append the ID near the
/// end (`title_12345678901_o.jpg`). A name with another 10-12 digit number
/// after the ID is misread; that is a known limitation.
pub fn extract_id(file_name: &str) -> Option<&str> {
    DIGIT_RUN_RE
        .find_iter(file_name)
        .filter(|m| (MIN_ID_LEN..=MAX_ID_LEN).contains(&m.len()))
        .last()
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_run_wins() {
        assert_eq!(extract_id("IMG_1234567890_9876543210_o.jpg"), Some("9876543210"));
        assert_eq!(extract_id("sunset_123456789012.jpg"), Some("123456789012"));
        assert_eq!(extract_id("20140603_12345678901_o.jpg"), Some("12345678901"));
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(extract_id("IMG_20140603.jpg"), None);
        assert_eq!(extract_id("a_123456789.jpg"), None);
        assert_eq!(extract_id("beach_1234567890123_o.jpg"), None);
        assert_eq!(extract_id("beach_1234567890123_1234567890.jpg"), Some("1234567890"));
        assert_eq!(extract_id("no digits here.mov"), None);
    }

    #[test]
    fn test_not_adjacent_to_digits() {
        // 14 digits: contains 10-12 digit substrings but none is a full run
        assert_eq!(extract_id("12345678901234.jpg"), None);
        assert_eq!(extract_id("x1234567890y.jpg"), Some("1234567890"));
    }
}
