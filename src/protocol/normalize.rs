use super::canonical::Segment;

/// Merge every run of adjacent text segments into a single text segment.
#[must_use]
pub fn merge_texts(parts: Vec<Segment>) -> Vec<Segment> {
    if parts.len() < 2 {
        return parts;
    }

    let mut merged: Vec<Segment> = Vec::with_capacity(parts.len());
    for part in parts {
        if let Segment::Text(text) = &part {
            if let Some(Segment::Text(prev)) = merged.last_mut() {
                prev.push_str(text);
                continue;
            }
        }
        merged.push(part);
    }
    merged
}

/// Canonical normalization of a segment list.
///
/// Adjacent texts are merged, then whitespace-only texts are removed. A
/// lone whitespace-only text survives when it is the only segment, so a
/// provider answering with bare whitespace still yields non-empty content.
/// Zero-length texts never survive.
#[must_use]
pub fn normalize(parts: Vec<Segment>) -> Vec<Segment> {
    let mut merged = merge_texts(parts);
    if merged.len() == 1 {
        if matches!(&merged[0], Segment::Text(text) if text.is_empty()) {
            merged.clear();
        }
        return merged;
    }
    merged.retain(|part| !is_blank_text(part));
    merged
}

/// Drop every whitespace-only text, with no single-segment exception.
#[must_use]
pub fn strip_blank_texts(mut parts: Vec<Segment>) -> Vec<Segment> {
    parts.retain(|part| !is_blank_text(part));
    parts
}

#[inline]
fn is_blank_text(part: &Segment) -> bool {
    matches!(part, Segment::Text(text) if text.trim().is_empty())
}
