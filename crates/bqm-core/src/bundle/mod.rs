//! The bundle entity: one queued download unit.
//!
//! A bundle is either a single file or a directory tree of files. The queue
//! registry owns every bundle through its token map; the directory index and
//! the search scheduler only hold tokens that resolve back through that map.

mod item;
mod priority;

use std::collections::HashMap;

use crate::pathing;

pub use item::QueueItem;
pub use priority::{BundleStatus, Priority};

#[derive(Debug, Clone, Copy, Default)]
struct DirCounts {
    queued: u32,
    finished: u32,
}

/// Outcome of removing an item from a bundle.
#[derive(Debug)]
pub struct ItemRemoval {
    pub item: QueueItem,
    /// Directory that lost its last tracked item, if any. The registry
    /// drops it from the directory index.
    pub removed_dir: Option<String>,
}

/// One queued download unit.
///
/// Mutated in place by the registry (priority, recency, items); persisted
/// and deleted through the `QueuePersister` collaborator. `priority`,
/// `recent` and `target` stay crate-private so scheduler and index
/// membership can never drift out of sync with the field.
#[derive(Debug, Clone)]
pub struct Bundle {
    token: String,
    target: String,
    priority: Priority,
    status: BundleStatus,
    file_bundle: bool,
    recent: bool,
    auto_priority: bool,
    dirty: bool,
    /// Unix seconds; basis of the recency window.
    time_added: u64,
    downloaded_bytes: u64,
    queue_items: Vec<QueueItem>,
    finished_items: Vec<QueueItem>,
    /// Item parent directories with live queued/finished counts.
    /// Always empty for file bundles.
    dirs: HashMap<String, DirCounts>,
    sources: Vec<String>,
    bad_sources: Vec<String>,
}

impl Bundle {
    /// A directory bundle rooted at `target`, with no items yet.
    pub fn directory(
        token: impl Into<String>,
        target: impl Into<String>,
        priority: Priority,
        time_added: u64,
    ) -> Self {
        Self {
            token: token.into(),
            target: target.into(),
            priority,
            status: BundleStatus::New,
            file_bundle: false,
            recent: false,
            auto_priority: true,
            dirty: true,
            time_added,
            downloaded_bytes: 0,
            queue_items: Vec::new(),
            finished_items: Vec::new(),
            dirs: HashMap::new(),
            sources: Vec::new(),
            bad_sources: Vec::new(),
        }
    }

    /// A bundle wrapping a single file.
    pub fn single_file(
        token: impl Into<String>,
        item: QueueItem,
        priority: Priority,
        time_added: u64,
    ) -> Self {
        let mut b = Self::directory(token, item.target.clone(), priority, time_added);
        b.file_bundle = true;
        b.queue_items.push(item);
        b
    }

    pub fn with_recent(mut self, recent: bool) -> Self {
        self.recent = recent;
        self
    }

    pub fn with_auto_priority(mut self, auto: bool) -> Self {
        self.auto_priority = auto;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn set_target(&mut self, target: String) {
        self.target = target;
        self.dirty = true;
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.dirty = true;
    }

    pub fn status(&self) -> BundleStatus {
        self.status
    }

    pub fn set_status(&mut self, status: BundleStatus) {
        self.status = status;
    }

    pub fn is_file_bundle(&self) -> bool {
        self.file_bundle
    }

    pub fn is_recent(&self) -> bool {
        self.recent
    }

    pub fn auto_priority(&self) -> bool {
        self.auto_priority
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called after a successful save.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn time_added(&self) -> u64 {
        self.time_added
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn queue_items(&self) -> &[QueueItem] {
        &self.queue_items
    }

    pub fn finished_items(&self) -> &[QueueItem] {
        &self.finished_items
    }

    /// Directories with at least one tracked item.
    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.keys().map(String::as_str)
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn bad_sources(&self) -> &[String] {
        &self.bad_sources
    }

    pub fn add_source(&mut self, peer: impl Into<String>) {
        self.sources.push(peer.into());
        self.dirty = true;
    }

    /// Moves a peer to the bad-source list (e.g. after repeated failures).
    pub fn mark_bad_source(&mut self, peer: &str) {
        if let Some(pos) = self.sources.iter().position(|s| s == peer) {
            let s = self.sources.remove(pos);
            self.bad_sources.push(s);
            self.dirty = true;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == BundleStatus::Finished
    }

    /// Whether the scheduler may pick this bundle for an automatic search.
    /// Finished or paused bundles never qualify; neither do bundles that
    /// already have enough sources.
    pub fn allow_auto_search(&self, source_limit: usize) -> bool {
        self.status == BundleStatus::Queued
            && !self.queue_items.is_empty()
            && self.sources.len() < source_limit
    }

    /// Re-evaluates the recency window. Clears the recent flag once
    /// `time_added + window` has passed and returns the current state.
    pub fn check_recent(&mut self, now_secs: u64, window_secs: u64) -> bool {
        if self.recent && self.time_added.saturating_add(window_secs) <= now_secs {
            self.recent = false;
        }
        self.recent
    }

    /// Resets the downloaded-byte accounting to completed segments only.
    pub fn reset_downloaded(&mut self) {
        self.downloaded_bytes = self.queue_items.iter().map(|i| i.downloaded).sum();
    }

    /// Queued bytes this bundle will still occupy on disk.
    ///
    /// With `reserve_full` every incomplete item counts at its full size
    /// (the space is reserved upfront); otherwise only the bytes not yet
    /// downloaded count.
    pub fn queued_disk_use(&self, reserve_full: bool) -> u64 {
        self.queue_items
            .iter()
            .map(|i| if reserve_full { i.size } else { i.remaining() })
            .sum()
    }

    /// Inputs for auto-priority scoring: current source count and bytes
    /// still missing. Fewer sources and more remaining data both push a
    /// bundle towards a higher priority.
    pub fn prio_info(&self) -> (usize, u64) {
        let remaining = self.queue_items.iter().map(QueueItem::remaining).sum();
        (self.sources.len(), remaining)
    }

    /// Adds a queued item. Returns the item's parent directory when it was
    /// not tracked before, so the registry can index it.
    pub fn add_queue_item(&mut self, item: QueueItem) -> Option<String> {
        self.dirty = true;
        let new_dir = self.track_dir(&item.target, false);
        self.queue_items.push(item);
        if self.status == BundleStatus::Finished {
            self.status = BundleStatus::Queued;
        }
        new_dir
    }

    /// Adds an already-completed item (queue loading, merges). Same
    /// directory-tracking contract as `add_queue_item`.
    pub fn add_finished_item(&mut self, item: QueueItem) -> Option<String> {
        self.dirty = true;
        let new_dir = self.track_dir(&item.target, true);
        self.finished_items.push(item);
        new_dir
    }

    /// Removes a queued item by target. With `finished` set the item moves
    /// to the finished list; otherwise it is dropped and its directory is
    /// untracked once empty. `None` when the item does not belong here.
    pub fn remove_queue_item(&mut self, target: &str, finished: bool) -> Option<ItemRemoval> {
        let pos = self
            .queue_items
            .iter()
            .position(|i| i.target.eq_ignore_ascii_case(target))?;
        let item = self.queue_items.remove(pos);
        self.dirty = true;

        let removed_dir = if finished {
            self.retrack_dir_finished(&item.target);
            self.finished_items.push(item.clone());
            None
        } else {
            self.untrack_dir(&item.target, false)
        };

        if self.queue_items.is_empty() && finished {
            self.status = BundleStatus::Finished;
        }
        Some(ItemRemoval { item, removed_dir })
    }

    /// Removes a finished item by target. `None` when absent.
    pub fn remove_finished_item(&mut self, target: &str) -> Option<ItemRemoval> {
        let pos = self
            .finished_items
            .iter()
            .position(|i| i.target.eq_ignore_ascii_case(target))?;
        let item = self.finished_items.remove(pos);
        self.dirty = true;
        let removed_dir = self.untrack_dir(&item.target, true);
        Some(ItemRemoval { item, removed_dir })
    }

    /// Registers the item's parent directory; returns it when newly tracked.
    fn track_dir(&mut self, item_target: &str, finished: bool) -> Option<String> {
        if self.file_bundle {
            return None;
        }
        let dir = pathing::parent_dir(item_target)?.to_string();
        let counts = self.dirs.entry(dir.clone()).or_default();
        let new_dir = counts.queued == 0 && counts.finished == 0;
        if finished {
            counts.finished += 1;
        } else {
            counts.queued += 1;
        }
        new_dir.then_some(dir)
    }

    /// Drops one count from the item's directory; returns the directory
    /// once nothing in it is tracked anymore.
    fn untrack_dir(&mut self, item_target: &str, finished: bool) -> Option<String> {
        if self.file_bundle {
            return None;
        }
        let dir = pathing::parent_dir(item_target)?.to_string();
        let counts = self.dirs.get_mut(&dir)?;
        if finished {
            counts.finished = counts.finished.saturating_sub(1);
        } else {
            counts.queued = counts.queued.saturating_sub(1);
        }
        if counts.queued == 0 && counts.finished == 0 {
            self.dirs.remove(&dir);
            Some(dir)
        } else {
            None
        }
    }

    /// Moves one count from queued to finished for the item's directory.
    fn retrack_dir_finished(&mut self, item_target: &str) {
        if self.file_bundle {
            return;
        }
        if let Some(dir) = pathing::parent_dir(item_target) {
            if let Some(counts) = self.dirs.get_mut(dir) {
                counts.queued = counts.queued.saturating_sub(1);
                counts.finished += 1;
            }
        }
    }
}
