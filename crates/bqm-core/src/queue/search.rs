//! Priority and recency based search scheduling.
//!
//! Bundles eligible for automatic searching live in one FIFO per priority
//! level (LOW..HIGHEST); bundles still inside their recency window cycle
//! through a separate FIFO instead. A bundle is a member of exactly one of
//! these structures, or none when its priority is below LOW.

use std::collections::VecDeque;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bundle::{Bundle, Priority};
use crate::config::QueueConfig;

use super::BundleMap;

/// Buckets for Low, Normal, High, Highest.
const SEARCH_LEVELS: usize = 4;
const MS_PER_MIN: u64 = 60 * 1000;

fn bucket_index(priority: Priority) -> Option<usize> {
    if priority < Priority::Low {
        None
    } else {
        Some(priority.ordinal() - Priority::Low.ordinal())
    }
}

/// How often each priority level has been picked, for tuning the weighting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionStats {
    pub low: u64,
    pub normal: u64,
    pub high: u64,
    pub highest: u64,
    /// Total non-recent selections.
    pub selections: u64,
}

pub struct SearchScheduler {
    prio_queues: [VecDeque<String>; SEARCH_LEVELS],
    recent: VecDeque<String>,
    /// Tick deadline for the next priority-queue search; 0 = unscheduled.
    next_search: u64,
    /// Tick deadline for the next recent-bundle search; 0 = unscheduled.
    next_recent_search: u64,
    stats: SelectionStats,
    rng: StdRng,
}

impl SearchScheduler {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic scheduler for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            prio_queues: Default::default(),
            recent: VecDeque::new(),
            next_search: 0,
            next_recent_search: 0,
            stats: SelectionStats::default(),
            rng,
        }
    }

    /// Registers a bundle with the scheduler. Bundles below LOW stay out;
    /// recent bundles go to the recency FIFO, the rest to their priority
    /// bucket.
    pub fn add(&mut self, bundle: &Bundle) {
        let Some(idx) = bucket_index(bundle.priority()) else {
            return;
        };
        let token = bundle.token();
        if bundle.is_recent() {
            debug_assert!(!self.recent.iter().any(|t| t == token));
            self.recent.push_back(token.to_string());
        } else {
            debug_assert!(!self.prio_queues[idx].iter().any(|t| t == token));
            self.prio_queues[idx].push_back(token.to_string());
        }
    }

    /// Removes a bundle from whichever structure holds it.
    pub fn remove(&mut self, bundle: &Bundle) {
        let Some(idx) = bucket_index(bundle.priority()) else {
            return;
        };
        let token = bundle.token();
        let queue = if bundle.is_recent() {
            &mut self.recent
        } else {
            &mut self.prio_queues[idx]
        };
        let pos = queue.iter().position(|t| t == token);
        debug_assert!(pos.is_some(), "bundle missing from its scheduler queue");
        if let Some(pos) = pos {
            queue.remove(pos);
        }
    }

    /// Pops the front of the recency FIFO. A bundle still inside its window
    /// goes to the back (round-robin); an expired one is demoted into its
    /// priority bucket. Returns the popped bundle's token either way.
    pub fn find_recent(
        &mut self,
        bundles: &mut BundleMap,
        now_secs: u64,
        window_secs: u64,
    ) -> Option<String> {
        let token = self.recent.pop_front()?;
        let Some(bundle) = bundles.get_mut(&token) else {
            debug_assert!(false, "recent queue held an unknown token");
            tracing::warn!(token = %token, "recent queue held a token not in the registry");
            return None;
        };
        if bundle.check_recent(now_secs, window_secs) {
            self.recent.push_back(token.clone());
        } else {
            self.add(bundle);
        }
        Some(token)
    }

    /// Per-level weights `(ordinal - 1) * eligible_count` and the total
    /// eligible bundle count.
    fn prio_weights(&self, bundles: &BundleMap, cfg: &QueueConfig) -> (Vec<u64>, u64) {
        let mut weights = Vec::with_capacity(SEARCH_LEVELS);
        let mut eligible_total = 0u64;
        for (idx, queue) in self.prio_queues.iter().enumerate() {
            let count = queue
                .iter()
                .filter(|t| {
                    bundles
                        .get(*t)
                        .is_some_and(|b| b.allow_auto_search(cfg.auto_search_limit))
                })
                .count() as u64;
            weights.push((idx as u64 + 1) * count);
            eligible_total += count;
        }
        (weights, eligible_total)
    }

    /// Weighted random selection over the priority buckets.
    ///
    /// Higher levels get proportionally more chances, while LOW keeps a
    /// nonzero floor through its bundle count. The picked bundle moves to
    /// the back of its bucket so one bundle cannot be re-selected
    /// perpetually. No fallback to another bucket when the sampled one has
    /// no eligible bundle.
    pub fn find_auto_search(&mut self, bundles: &BundleMap, cfg: &QueueConfig) -> Option<String> {
        let (weights, eligible_total) = self.prio_weights(bundles, cfg);
        // an all-zero distribution cannot be sampled
        if eligible_total == 0 {
            return None;
        }

        let dist = WeightedIndex::new(&weights).ok()?;
        let level = dist.sample(&mut self.rng);

        let queue = &mut self.prio_queues[level];
        let pos = queue.iter().position(|t| {
            bundles
                .get(t)
                .is_some_and(|b| b.allow_auto_search(cfg.auto_search_limit))
        })?;
        let token = queue.remove(pos)?;
        queue.push_back(token.clone());
        Some(token)
    }

    /// The periodic scheduling decision: try the priority queues when their
    /// deadline has passed, then the recency FIFO. `force` bypasses both
    /// deadlines and the auto-search setting.
    pub fn find_search_bundle(
        &mut self,
        bundles: &mut BundleMap,
        cfg: &QueueConfig,
        tick: u64,
        now_secs: u64,
        force: bool,
    ) -> Option<String> {
        let mut selected = None;
        if (cfg.auto_search && tick >= self.next_search && !bundles.is_empty()) || force {
            selected = self.find_auto_search(bundles, cfg);
        }

        if selected.is_none() && ((cfg.auto_search && tick >= self.next_recent_search) || force) {
            selected = self.find_recent(bundles, now_secs, cfg.recent_window_secs());
        }

        if let Some(token) = &selected {
            if let Some(bundle) = bundles.get(token) {
                if bundle.is_recent() {
                    tracing::debug!(token = %token, "selected recent bundle for search");
                } else {
                    self.record_selection(bundle.priority());
                    tracing::debug!(
                        token = %token,
                        priority = bundle.priority().as_str(),
                        selections = self.stats.selections,
                        "selected bundle for automatic search"
                    );
                }
            }
        }
        selected
    }

    fn record_selection(&mut self, priority: Priority) {
        self.stats.selections += 1;
        match priority {
            Priority::Low => self.stats.low += 1,
            Priority::Normal => self.stats.normal += 1,
            Priority::High => self.stats.high += 1,
            Priority::Highest => self.stats.highest += 1,
            Priority::Paused | Priority::Lowest => {}
        }
    }

    /// Recomputes the next search deadline and returns it.
    ///
    /// Priority queue: `now + max(60 / eligible, configured minimum)`
    /// minutes. Recency FIFO: 5 minutes when more than one recent bundle
    /// exists, 10 otherwise. A recalculation caused by a priority raise
    /// never pushes an already-scheduled deadline later.
    pub fn recalculate_search_times(
        &mut self,
        bundles: &BundleMap,
        cfg: &QueueConfig,
        recent: bool,
        prio_change: bool,
        tick: u64,
    ) -> u64 {
        if !recent {
            let (_, eligible) = self.prio_weights(bundles, cfg);
            let mut mins = cfg.search_time_mins;
            if eligible > 0 {
                mins = mins.max(60 / eligible);
            }
            let fresh = tick + mins * MS_PER_MIN;
            self.next_search = if self.next_search > 0 && prio_change {
                self.next_search.min(fresh)
            } else {
                fresh
            };
            self.next_search
        } else {
            let mins = if self.recent.len() > 1 { 5 } else { 10 };
            let fresh = tick + mins * MS_PER_MIN;
            self.next_recent_search = if self.next_recent_search > 0 && prio_change {
                self.next_recent_search.min(fresh)
            } else {
                fresh
            };
            self.next_recent_search
        }
    }

    pub fn stats(&self) -> SelectionStats {
        self.stats
    }

    pub fn next_search(&self) -> u64 {
        self.next_search
    }

    pub fn next_recent_search(&self) -> u64 {
        self.next_recent_search
    }

    pub fn bucket_len(&self, priority: Priority) -> usize {
        bucket_index(priority).map_or(0, |i| self.prio_queues[i].len())
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Whether the token sits in any priority bucket or the recency FIFO.
    pub fn is_scheduled(&self, token: &str) -> bool {
        self.recent.iter().any(|t| t == token)
            || self.prio_queues.iter().any(|q| q.iter().any(|t| t == token))
    }
}

impl Default for SearchScheduler {
    fn default() -> Self {
        Self::new()
    }
}
