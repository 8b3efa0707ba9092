use crate::ids::Fingerprint;
use crate::review::Platform;

const EXACT_TAG: &[u8] = b"reviewsync/exact/v1";
const SOFT_TAG: &[u8] = b"reviewsync/soft/v1";

/// Collapse whitespace runs to one space and trim.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `clean` followed by case folding. This is the form every key input is hashed in.
pub fn normalize(text: &str) -> String {
    clean(text).to_lowercase()
}

fn fingerprint(tag: &[u8], parts: &[&str]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(tag.len() as u64).to_be_bytes());
    hasher.update(tag);
    for part in parts {
        let norm = normalize(part);
        hasher.update(&(norm.len() as u64).to_be_bytes());
        hasher.update(norm.as_bytes());
    }
    Fingerprint::from_bytes(*hasher.finalize().as_bytes())
}

/// Identifies one source occurrence of a review.
pub fn exact_key(platform: &Platform, reviewer: &str, text: &str, url_or_location: &str) -> Fingerprint {
    fingerprint(EXACT_TAG, &[platform.as_str(), reviewer, text, url_or_location])
}

/// Identifies a review's content regardless of which url surfaced it.
/// Blank reviewer and text still produce a key; no collision guard is applied.
pub fn soft_key(platform: &Platform, reviewer: &str, text: &str) -> Fingerprint {
    fingerprint(SOFT_TAG, &[platform.as_str(), reviewer, text])
}

/// Soft key for a stored row, where the platform column is free text.
pub fn soft_key_from_cells(platform: &str, reviewer: &str, text: &str) -> Fingerprint {
    fingerprint(SOFT_TAG, &[platform, reviewer, text])
}
