//! Directory index: final path segment -> (full path, owning bundle).
//!
//! Multiple unrelated bundles may share a last segment (two releases both
//! containing a "Sample" folder), so each key holds a list of entries rather
//! than a single one.

use std::collections::HashMap;

use crate::pathing;

#[derive(Debug, Clone)]
struct DirEntry {
    path: String,
    token: String,
}

/// Maps a directory's case-normalized final segment to every tracked
/// directory ending in that segment.
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    dirs: HashMap<String, Vec<DirEntry>>,
}

impl DirectoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `path` under its final segment. Duplicate (path, token)
    /// pairs are ignored; paths without a segment are not indexable.
    pub fn insert(&mut self, path: &str, token: &str) {
        let Some(key) = pathing::last_segment(path) else {
            return;
        };
        let bucket = self.dirs.entry(key.to_ascii_lowercase()).or_default();
        if bucket
            .iter()
            .any(|e| e.token == token && e.path.eq_ignore_ascii_case(path))
        {
            return;
        }
        bucket.push(DirEntry {
            path: path.to_string(),
            token: token.to_string(),
        });
    }

    /// Removes the entry matching both the final-segment key and the full
    /// path. No-op when absent.
    pub fn remove(&mut self, path: &str) {
        let Some(key) = pathing::last_segment(path) else {
            return;
        };
        let key = key.to_ascii_lowercase();
        if let Some(bucket) = self.dirs.get_mut(&key) {
            if let Some(pos) = bucket.iter().position(|e| e.path.eq_ignore_ascii_case(path)) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                self.dirs.remove(&key);
            }
        }
    }

    /// Exact full-path lookup; returns the owning bundle's token.
    pub fn find_local(&self, path: &str) -> Option<&str> {
        let key = pathing::last_segment(path)?.to_ascii_lowercase();
        self.dirs
            .get(&key)?
            .iter()
            .find(|e| e.path.eq_ignore_ascii_case(path))
            .map(|e| e.token.as_str())
    }

    /// Matches a directory path from a remote file listing against tracked
    /// local directories.
    ///
    /// A plain final-segment hit is enough for distinctive names. For disc
    /// style segments ("CD1", "Sample", ...) the parent chains of both paths
    /// are walked upward and must agree on the first non-disc segment;
    /// candidates whose chains diverge, or that run out of parents before a
    /// distinctive segment matches, are rejected.
    pub fn find_remote(&self, remote_path: &str) -> Vec<(&str, &str)> {
        let Some(last) = pathing::last_segment(remote_path) else {
            return Vec::new();
        };
        let Some(bucket) = self.dirs.get(&last.to_ascii_lowercase()) else {
            return Vec::new();
        };

        let ambiguous = pathing::is_release_sub_dir(last);
        bucket
            .iter()
            .filter(|e| !ambiguous || parent_chain_matches(remote_path, &e.path))
            .map(|e| (e.path.as_str(), e.token.as_str()))
            .collect()
    }

    /// Total number of indexed directories, across all keys.
    pub fn entry_count(&self) -> usize {
        self.dirs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// Walks both parent chains upward, last segment first. Matching disc-style
/// segments keep the walk going; the first distinctive segment pair decides.
fn parent_chain_matches(remote: &str, local: &str) -> bool {
    let mut remote_segs = pathing::segments_rev(remote).skip(1);
    let mut local_segs = pathing::segments_rev(local).skip(1);
    loop {
        match (remote_segs.next(), local_segs.next()) {
            (Some(r), Some(l)) => {
                if !r.eq_ignore_ascii_case(l) {
                    return false;
                }
                if !pathing::is_release_sub_dir(r) {
                    return true;
                }
            }
            // one side exhausted before a distinctive segment matched
            _ => return false,
        }
    }
}
