//! The bundle registry: token map plus the composed index, scheduler and
//! disk projector.
//!
//! All operations assume the caller already holds exclusive access (see
//! `QueueLock`); nothing here locks or blocks, and only `save_queue`
//! touches I/O through the injected persister.

use std::collections::HashMap;

use crate::bundle::{Bundle, BundleStatus, Priority, QueueItem};
use crate::config::QueueConfig;
use crate::pathing;
use crate::persist::QueuePersister;

use super::dir_index::DirectoryIndex;
use super::disk;
use super::search::{SearchScheduler, SelectionStats};
use super::BundleMap;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("bundle {token} is already queued")]
    AlreadyExists { token: String },
}

/// Bundles matching a path query, split the way the queue dialogs need it.
#[derive(Debug, Default)]
pub struct PathInfo<'a> {
    pub bundles: Vec<&'a Bundle>,
    pub finished_files: usize,
    pub file_bundles: usize,
}

/// Owns every queued bundle and keeps the directory index and the search
/// scheduler consistent with the token map.
pub struct BundleQueue {
    bundles: BundleMap,
    dirs: DirectoryIndex,
    search: SearchScheduler,
}

impl BundleQueue {
    pub fn new() -> Self {
        Self::with_scheduler(SearchScheduler::new())
    }

    /// Queue with a deterministic search scheduler, for tests.
    pub fn with_search_seed(seed: u64) -> Self {
        Self::with_scheduler(SearchScheduler::with_seed(seed))
    }

    fn with_scheduler(search: SearchScheduler) -> Self {
        Self {
            bundles: HashMap::new(),
            dirs: DirectoryIndex::new(),
            search,
        }
    }

    /// Registers a new bundle. The transient `New` status is cleared, byte
    /// accounting is reset to completed segments, the bundle joins the
    /// scheduler when its priority qualifies, and a directory bundle's root
    /// is indexed unless its items already track it.
    pub fn add_bundle(&mut self, mut bundle: Bundle) -> Result<(), QueueError> {
        if self.bundles.contains_key(bundle.token()) {
            return Err(QueueError::AlreadyExists {
                token: bundle.token().to_string(),
            });
        }

        if bundle.status() == BundleStatus::New {
            bundle.set_status(BundleStatus::Queued);
        }
        bundle.reset_downloaded();
        self.search.add(&bundle);

        if !bundle.is_file_bundle() {
            // items may predate registration (queue load): index their dirs
            let mut root_tracked = false;
            for dir in bundle.dirs() {
                self.dirs.insert(dir, bundle.token());
                root_tracked |= dir.eq_ignore_ascii_case(bundle.target());
            }
            if !root_tracked {
                self.dirs.insert(bundle.target(), bundle.token());
            }
        }

        self.bundles.insert(bundle.token().to_string(), bundle);
        Ok(())
    }

    pub fn find_bundle(&self, token: &str) -> Option<&Bundle> {
        self.bundles.get(token)
    }

    pub fn find_bundle_mut(&mut self, token: &str) -> Option<&mut Bundle> {
        self.bundles.get_mut(token)
    }

    /// Exact directory lookup through the index.
    pub fn find_dir(&self, path: &str) -> Option<&Bundle> {
        let token = self.dirs.find_local(path)?;
        self.bundles.get(token)
    }

    /// Adds an item to a bundle, indexing the item's directory when the
    /// bundle starts tracking it.
    pub fn add_bundle_item(&mut self, token: &str, item: QueueItem) {
        let Some(bundle) = self.bundles.get_mut(token) else {
            debug_assert!(false, "add_bundle_item: unknown bundle");
            tracing::warn!(token = %token, "add_bundle_item called with an unknown bundle");
            return;
        };
        if let Some(dir) = bundle.add_queue_item(item) {
            self.dirs.insert(&dir, token);
        }
    }

    /// Removes an item from its bundle. With `finished` set the item counts
    /// as completed; otherwise a directory losing its last item is dropped
    /// from the index. Returns the removed item.
    pub fn remove_bundle_item(
        &mut self,
        token: &str,
        item_target: &str,
        finished: bool,
    ) -> Option<QueueItem> {
        let Some(bundle) = self.bundles.get_mut(token) else {
            debug_assert!(false, "remove_bundle_item: unknown bundle");
            tracing::warn!(token = %token, "remove_bundle_item called with an unknown bundle");
            return None;
        };
        match bundle.remove_queue_item(item_target, finished) {
            Some(removal) => {
                if let Some(dir) = removal.removed_dir {
                    self.dirs.remove(&dir);
                }
                Some(removal.item)
            }
            None => {
                debug_assert!(false, "remove_bundle_item: item not in bundle");
                tracing::warn!(
                    token = %token,
                    item = %item_target,
                    "tried to remove an item from a bundle it does not belong to"
                );
                None
            }
        }
    }

    /// Registers an already-completed item with a bundle.
    pub fn add_finished_item(&mut self, token: &str, item: QueueItem) {
        let Some(bundle) = self.bundles.get_mut(token) else {
            debug_assert!(false, "add_finished_item: unknown bundle");
            tracing::warn!(token = %token, "add_finished_item called with an unknown bundle");
            return;
        };
        if let Some(dir) = bundle.add_finished_item(item) {
            self.dirs.insert(&dir, token);
        }
    }

    /// Removes a finished item from a bundle, dropping its directory from
    /// the index when nothing else keeps it alive.
    pub fn remove_finished_item(&mut self, token: &str, item_target: &str) -> Option<QueueItem> {
        let bundle = self.bundles.get_mut(token)?;
        let removal = bundle.remove_finished_item(item_target)?;
        if let Some(dir) = removal.removed_dir {
            self.dirs.remove(&dir);
        }
        Some(removal.item)
    }

    /// Unregisters a bundle: index and scheduler first, then the token map,
    /// then the persisted file. `New` bundles were never queued and are left
    /// untouched. Returns the removed bundle.
    pub fn remove_bundle(
        &mut self,
        token: &str,
        persister: &mut dyn QueuePersister,
    ) -> Option<Bundle> {
        let bundle = self.bundles.get(token)?;
        if bundle.status() == BundleStatus::New {
            return None;
        }

        // index/scheduler before the token map, so no lookup can see a
        // half-removed bundle
        if !bundle.is_file_bundle() {
            let tracked: Vec<String> = bundle.dirs().map(str::to_string).collect();
            let root = bundle.target().to_string();
            self.dirs.remove(&root);
            for dir in &tracked {
                self.dirs.remove(dir);
            }
        }
        self.search.remove(self.bundles.get(token)?);

        let bundle = self.bundles.remove(token)?;
        if let Err(e) = persister.delete(&bundle) {
            tracing::warn!(token = %bundle.token(), error = %e, "failed to delete bundle file");
        }
        Some(bundle)
    }

    /// Retargets a bundle, reindexing its root directory. Scheduler
    /// membership is unaffected.
    pub fn move_bundle(&mut self, token: &str, new_target: &str) {
        let Some(bundle) = self.bundles.get_mut(token) else {
            debug_assert!(false, "move_bundle: unknown bundle");
            tracing::warn!(token = %token, "move_bundle called with an unknown bundle");
            return;
        };
        if !bundle.is_file_bundle() {
            self.dirs.remove(bundle.target());
        }
        bundle.set_target(new_target.to_string());
        if !bundle.is_file_bundle() {
            self.dirs.insert(new_target, token);
        }
    }

    /// Moves a bundle between scheduler buckets when its priority changes.
    pub fn set_bundle_priority(&mut self, token: &str, priority: Priority) {
        let Some(bundle) = self.bundles.get_mut(token) else {
            return;
        };
        if bundle.priority() == priority {
            return;
        }
        self.search.remove(bundle);
        bundle.set_priority(priority);
        self.search.add(bundle);
    }

    /// First directory bundle whose target is an ancestor, descendant or
    /// exact match of `path` — new content for `path` can merge into it.
    pub fn get_merge_bundle(&self, path: &str) -> Option<&Bundle> {
        self.bundles.values().find(|b| {
            !b.is_file_bundle()
                && (pathing::is_sub(path, b.target())
                    || pathing::is_parent_or_exact(path, b.target()))
        })
    }

    /// Directory bundles strictly contained under `path` (absorbed when a
    /// parent-level bundle is created).
    pub fn get_sub_bundles(&self, path: &str) -> Vec<&Bundle> {
        self.bundles
            .values()
            .filter(|b| !b.is_file_bundle() && pathing::is_sub(b.target(), path))
            .collect()
    }

    /// Classifies unfinished bundles against `path`. Bundles at or under
    /// `path` are collected with their full finished counts; the first
    /// bundle that contains `path` as a subfolder ends the scan, and only
    /// its finished items under `path` are counted.
    pub fn get_info(&self, path: &str) -> PathInfo<'_> {
        let mut info = PathInfo::default();
        let mut sub_folder: Option<&Bundle> = None;

        for bundle in self.bundles.values() {
            if bundle.is_finished() {
                continue;
            }
            if pathing::is_parent_or_exact(path, bundle.target()) {
                info.bundles.push(bundle);
                if bundle.is_file_bundle() {
                    info.file_bundles += 1;
                }
            } else if !bundle.is_file_bundle() && pathing::is_sub(path, bundle.target()) {
                info.bundles.push(bundle);
                sub_folder = Some(bundle);
                break;
            }
        }

        info.finished_files = match sub_folder {
            Some(bundle) => bundle
                .finished_items()
                .iter()
                .filter(|i| pathing::is_sub(&i.target, path))
                .count(),
            None => info.bundles.iter().map(|b| b.finished_items().len()).sum(),
        };
        info
    }

    /// Queued plus finished items across all bundles.
    pub fn total_files(&self) -> usize {
        self.bundles
            .values()
            .map(|b| b.queue_items().len() + b.finished_items().len())
            .sum()
    }

    /// Persists dirty bundles (all non-finished ones with `force`). A save
    /// failure is logged and does not stop the remaining saves.
    pub fn save_queue(&mut self, force: bool, persister: &mut dyn QueuePersister) {
        for bundle in self.bundles.values_mut() {
            if bundle.is_finished() || !(bundle.is_dirty() || force) {
                continue;
            }
            match persister.save(bundle) {
                Ok(()) => bundle.mark_saved(),
                Err(e) => tracing::warn!(
                    token = %bundle.token(),
                    error = %e,
                    "failed to save bundle, continuing with the rest"
                ),
            }
        }
    }

    /// Local directories matching a remote peer's directory path.
    pub fn find_remote_dirs(&self, remote_path: &str) -> Vec<(&str, &Bundle)> {
        self.dirs
            .find_remote(remote_path)
            .into_iter()
            .filter_map(|(path, token)| self.bundles.get(token).map(|b| (path, b)))
            .collect()
    }

    /// Picks the next bundle to search for, if any. `tick` is monotonic
    /// milliseconds, `now_secs` wall-clock seconds.
    pub fn find_search_bundle(
        &mut self,
        cfg: &QueueConfig,
        tick: u64,
        now_secs: u64,
        force: bool,
    ) -> Option<&Bundle> {
        let token = self
            .search
            .find_search_bundle(&mut self.bundles, cfg, tick, now_secs, force)?;
        self.bundles.get(&token)
    }

    /// Recomputes the search deadline on the queue the bundle belongs to
    /// and returns it. `None` for an unknown token.
    pub fn recalculate_search_times(
        &mut self,
        token: &str,
        prio_change: bool,
        tick: u64,
        cfg: &QueueConfig,
    ) -> Option<u64> {
        let recent = self.bundles.get(token)?.is_recent();
        Some(
            self.search
                .recalculate_search_times(&self.bundles, cfg, recent, prio_change, tick),
        )
    }

    /// Projects queued bytes onto the given per-volume free-space figures.
    pub fn get_disk_info(&self, free_by_volume: &mut HashMap<String, i64>, cfg: &QueueConfig) {
        disk::project(&self.bundles, free_by_volume, cfg);
    }

    /// Scores auto-priority bundles for periodic rebalancing, lowest score
    /// first. Source starvation and remaining bytes are each scaled to
    /// 0..100 and summed; the caller maps score ranks back onto priority
    /// levels. Empty when fewer than two bundles take part.
    pub fn auto_priority_scores(&self) -> Vec<(f64, &str)> {
        let candidates: Vec<(&Bundle, usize, u64)> = self
            .bundles
            .values()
            .filter(|b| b.auto_priority() && !b.is_finished())
            .map(|b| {
                let (sources, remaining) = b.prio_info();
                (b, sources, remaining)
            })
            .collect();
        if candidates.len() <= 1 {
            return Vec::new();
        }

        let max_sources = candidates.iter().map(|c| c.1).max().unwrap_or(0);
        let max_remaining = candidates.iter().map(|c| c.2).max().unwrap_or(0);

        let mut scores: Vec<(f64, &str)> = candidates
            .iter()
            .map(|(b, sources, remaining)| {
                let mut score = 0.0;
                if max_sources > 0 {
                    let starvation = (max_sources - sources) as f64;
                    score += starvation * (100.0 / max_sources as f64);
                }
                if max_remaining > 0 {
                    score += *remaining as f64 * (100.0 / max_remaining as f64);
                }
                (score, b.token())
            })
            .collect();
        scores.sort_by(|a, b| a.0.total_cmp(&b.0));
        scores
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Number of indexed directories, for diagnostics.
    pub fn indexed_dir_count(&self) -> usize {
        self.dirs.entry_count()
    }

    pub fn search_stats(&self) -> SelectionStats {
        self.search.stats()
    }

    pub fn next_search(&self) -> u64 {
        self.search.next_search()
    }

    pub fn next_recent_search(&self) -> u64 {
        self.search.next_recent_search()
    }

    /// Whether the token sits in a scheduler bucket or the recency FIFO.
    pub fn is_scheduled(&self, token: &str) -> bool {
        self.search.is_scheduled(token)
    }

    pub fn scheduled_at(&self, priority: Priority) -> usize {
        self.search.bucket_len(priority)
    }

    pub fn recent_queue_len(&self) -> usize {
        self.search.recent_len()
    }
}

impl Default for BundleQueue {
    fn default() -> Self {
        Self::new()
    }
}
