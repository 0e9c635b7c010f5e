use crate::media::MediaFile;

/// Flickr marks the untouched upload with `_o` before the extension.
const ORIGINAL_MARKER: &str = "_o.";

/// Sort candidates by case-insensitive path. Raw path breaks ties so the
/// order is total and independent of scan order.
pub fn sort_candidates(candidates: &mut [&MediaFile]) {
    candidates.sort_by(|a, b| {
        let la = a.path.to_string_lossy().to_lowercase();
        let lb = b.path.to_string_lossy().to_lowercase();
        la.cmp(&lb).then_with(|| a.path.cmp(&b.path))
    });
}

fn is_original(file: &MediaFile) -> bool {
    file.file_name().to_lowercase().contains(ORIGINAL_MARKER)
}

/// Pick the single file to write for an ID: the first original in sorted
/// order, else the first file in sorted order.
pub fn pick_best(candidates: &[MediaFile]) -> Option<&MediaFile> {
    let mut sorted: Vec<&MediaFile> = candidates.iter().collect();
    sort_candidates(&mut sorted);
    sorted
        .iter()
        .find(|f| is_original(f))
        .or_else(|| sorted.first())
        .copied()
}
