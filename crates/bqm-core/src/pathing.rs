//! Path comparison helpers for queue targets.
//!
//! Queue targets are plain strings coming from the share/download layer and
//! may use either separator. Comparisons are segment-wise and ASCII
//! case-insensitive, matching the rest of the client.

use std::sync::LazyLock;

use regex::Regex;

/// Directory names that repeat across unrelated releases (disc parts,
/// samples, subs). A final-segment match on one of these is not enough to
/// identify a directory; the parent chain has to be checked too.
static RELEASE_SUB_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:dvd|cd|dis[ck])[\s_.-]?\d{1,2}|r\d|sample|proof|covers?|subs?|subpack)$")
        .expect("valid release sub-dir pattern")
});

/// True when `name` looks like a disc/extras sub-directory ("CD1", "Disc 2",
/// "Sample", ...).
pub fn is_release_sub_dir(name: &str) -> bool {
    RELEASE_SUB_DIR.is_match(name)
}

/// Non-empty path segments, first to last. Accepts `/` and `\` separators.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

/// Non-empty path segments, last to first.
pub fn segments_rev(path: &str) -> impl Iterator<Item = &str> {
    path.rsplit(['/', '\\']).filter(|s| !s.is_empty())
}

/// Final path segment, or `None` for an empty/root path.
pub fn last_segment(path: &str) -> Option<&str> {
    segments_rev(path).next()
}

/// The directory part of `path` (everything up to the final segment).
/// `None` when the path has no parent.
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let cut = trimmed.rfind(['/', '\\'])?;
    let parent = trimmed[..cut].trim_end_matches(['/', '\\']);
    if parent.is_empty() {
        None
    } else {
        Some(parent)
    }
}

fn seg_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// True when `sub` lies inside `parent` or is the same directory.
pub fn is_parent_or_exact(parent: &str, sub: &str) -> bool {
    let mut sub_segs = segments(sub);
    for p in segments(parent) {
        match sub_segs.next() {
            Some(s) if seg_eq(p, s) => {}
            _ => return false,
        }
    }
    true
}

/// True when `sub` lies strictly inside `parent`.
pub fn is_sub(sub: &str, parent: &str) -> bool {
    let mut sub_segs = segments(sub);
    for p in segments(parent) {
        match sub_segs.next() {
            Some(s) if seg_eq(p, s) => {}
            _ => return false,
        }
    }
    sub_segs.next().is_some()
}
