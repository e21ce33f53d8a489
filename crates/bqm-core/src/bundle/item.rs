//! A single file entry tracked by a bundle.

/// One file of a bundle, either still queued or finished.
///
/// `downloaded` counts bytes in completed segments only; partially written
/// segments are not accounted for until they finish.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub target: String,
    pub size: u64,
    pub downloaded: u64,
}

impl QueueItem {
    pub fn new(target: impl Into<String>, size: u64) -> Self {
        Self {
            target: target.into(),
            size,
            downloaded: 0,
        }
    }

    /// Bytes still missing from this item.
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.downloaded)
    }
}
