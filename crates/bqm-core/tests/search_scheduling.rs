//! Integration tests for the search scheduler: weighted selection,
//! round-robin fairness, the recent rotation and deadline handling.

mod common;

use bqm_core::bundle::Priority;
use bqm_core::config::QueueConfig;
use bqm_core::queue::BundleQueue;
use common::{dir_bundle, MemPersister, ADDED_AT};

const IN_WINDOW: u64 = ADDED_AT + 60;
const PAST_WINDOW: u64 = ADDED_AT + 48 * 3600;

fn pick(q: &mut BundleQueue, cfg: &QueueConfig) -> Option<String> {
    q.find_search_bundle(cfg, 0, IN_WINDOW, false)
        .map(|b| b.token().to_string())
}

#[test]
fn single_bucket_selection_is_round_robin() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    for (token, target) in [("a", r"C:\dl\A"), ("b", r"C:\dl\B"), ("c", r"C:\dl\C")] {
        q.add_bundle(dir_bundle(token, target, Priority::Normal))
            .unwrap();
    }

    let picks: Vec<String> = (0..6).map(|_| pick(&mut q, &cfg).unwrap()).collect();

    // every bundle is picked once before any repeats
    let mut first_three = picks[..3].to_vec();
    first_three.sort();
    assert_eq!(first_three, vec!["a", "b", "c"]);
    // and the rotation repeats
    assert_eq!(picks[3..], picks[..3]);
}

#[test]
fn ineligible_bundles_are_never_selected() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("ok", r"C:\dl\OK", Priority::Normal))
        .unwrap();
    let mut saturated = dir_bundle("full", r"C:\dl\Full", Priority::Normal);
    for i in 0..cfg.auto_search_limit {
        saturated.add_source(format!("peer-{i}"));
    }
    q.add_bundle(saturated).unwrap();

    for _ in 0..10 {
        assert_eq!(pick(&mut q, &cfg).as_deref(), Some("ok"));
    }
}

#[test]
fn no_eligible_bundles_means_no_selection() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    assert!(pick(&mut q, &cfg).is_none(), "empty registry");

    let mut saturated = dir_bundle("full", r"C:\dl\Full", Priority::Normal);
    for i in 0..cfg.auto_search_limit {
        saturated.add_source(format!("peer-{i}"));
    }
    q.add_bundle(saturated).unwrap();
    assert!(pick(&mut q, &cfg).is_none(), "all bundles ineligible");
}

#[test]
fn paused_and_lowest_stay_out_of_the_scheduler() {
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("p", r"C:\dl\P", Priority::Paused))
        .unwrap();
    q.add_bundle(dir_bundle("l", r"C:\dl\L", Priority::Lowest))
        .unwrap();

    assert!(!q.is_scheduled("p"));
    assert!(!q.is_scheduled("l"));

    let cfg = QueueConfig::default();
    assert!(pick(&mut q, &cfg).is_none());
}

#[test]
fn priority_changes_move_bundles_between_buckets() {
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("a", r"C:\dl\A", Priority::Paused))
        .unwrap();
    assert!(!q.is_scheduled("a"));

    q.set_bundle_priority("a", Priority::High);
    assert!(q.is_scheduled("a"));
    assert_eq!(q.scheduled_at(Priority::High), 1);

    q.set_bundle_priority("a", Priority::Low);
    assert_eq!(q.scheduled_at(Priority::High), 0);
    assert_eq!(q.scheduled_at(Priority::Low), 1);

    q.set_bundle_priority("a", Priority::Paused);
    assert!(!q.is_scheduled("a"));
}

#[test]
fn higher_priority_levels_are_selected_more_often() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("low", r"C:\dl\Low", Priority::Low))
        .unwrap();
    q.add_bundle(dir_bundle("top", r"C:\dl\Top", Priority::Highest))
        .unwrap();

    let mut top_picks = 0u32;
    let mut low_picks = 0u32;
    for _ in 0..200 {
        match pick(&mut q, &cfg).as_deref() {
            Some("top") => top_picks += 1,
            Some("low") => low_picks += 1,
            other => panic!("unexpected selection {other:?}"),
        }
    }
    // weights are 4:1 in favor of the highest bucket
    assert!(low_picks > 0, "low keeps a nonzero floor");
    assert!(
        top_picks > low_picks * 2,
        "expected a strong skew, got {top_picks} vs {low_picks}"
    );

    let stats = q.search_stats();
    assert_eq!(stats.selections, 200);
    assert_eq!(stats.low, low_picks as u64);
    assert_eq!(stats.highest, top_picks as u64);
}

#[test]
fn recent_bundles_rotate_through_the_fifo() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("x", r"C:\dl\X", Priority::Normal).with_recent(true))
        .unwrap();
    q.add_bundle(dir_bundle("y", r"C:\dl\Y", Priority::Normal).with_recent(true))
        .unwrap();
    assert_eq!(q.recent_queue_len(), 2);

    // still within the window: x is served and requeued behind y
    assert_eq!(pick(&mut q, &cfg).as_deref(), Some("x"));
    assert_eq!(q.recent_queue_len(), 2);
    assert_eq!(pick(&mut q, &cfg).as_deref(), Some("y"));
    assert_eq!(pick(&mut q, &cfg).as_deref(), Some("x"));
}

#[test]
fn expired_recent_bundles_are_demoted_to_their_priority_bucket() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("x", r"C:\dl\X", Priority::Normal).with_recent(true))
        .unwrap();
    q.add_bundle(dir_bundle("y", r"C:\dl\Y", Priority::Normal).with_recent(true))
        .unwrap();

    let picked = q
        .find_search_bundle(&cfg, 0, PAST_WINDOW, false)
        .map(|b| b.token().to_string());
    assert_eq!(picked.as_deref(), Some("x"));

    // x left the recency rotation and joined its bucket
    assert_eq!(q.recent_queue_len(), 1);
    assert_eq!(q.scheduled_at(Priority::Normal), 1);
    assert!(!q.find_bundle("x").unwrap().is_recent());
    assert!(q.is_scheduled("x"));
}

#[test]
fn deadlines_gate_selection_and_force_overrides() {
    let mut cfg = QueueConfig::default();
    cfg.search_time_mins = 5;
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("a", r"C:\dl\A", Priority::Normal))
        .unwrap();

    let deadline = q.recalculate_search_times("a", false, 0, &cfg).unwrap();
    assert!(deadline > 0);

    // before the deadline nothing is selected
    assert!(q.find_search_bundle(&cfg, deadline - 1, IN_WINDOW, false).is_none());
    // at the deadline the bundle is served
    assert!(q.find_search_bundle(&cfg, deadline, IN_WINDOW, false).is_some());
    // force ignores deadlines and the auto-search switch
    cfg.auto_search = false;
    assert!(q.find_search_bundle(&cfg, 0, IN_WINDOW, true).is_some());
    cfg.auto_search = true;
    assert!(q.find_search_bundle(&cfg, 0, IN_WINDOW, false).is_none());
}

#[test]
fn recent_deadline_depends_on_rotation_size() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    q.add_bundle(dir_bundle("x", r"C:\dl\X", Priority::Normal).with_recent(true))
        .unwrap();

    // a single recent bundle is searched every 10 minutes
    let single = q.recalculate_search_times("x", false, 0, &cfg).unwrap();
    assert_eq!(single, 10 * 60 * 1000);

    q.add_bundle(dir_bundle("y", r"C:\dl\Y", Priority::Normal).with_recent(true))
        .unwrap();
    // more than one: every 5 minutes, and the earlier deadline wins on a
    // priority-change event
    let multi = q.recalculate_search_times("x", true, 0, &cfg).unwrap();
    assert_eq!(multi, 5 * 60 * 1000);
}

#[test]
fn recalculate_for_an_unknown_token_is_none() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    assert!(q.recalculate_search_times("ghost", false, 0, &cfg).is_none());
}

#[test]
fn token_map_and_scheduler_stay_consistent_over_churn() {
    let cfg = QueueConfig::default();
    let mut q = BundleQueue::with_search_seed(42);
    let mut persister = MemPersister::new();

    for i in 0..8 {
        let token = format!("b{i}");
        let target = format!(r"C:\dl\B{i}");
        q.add_bundle(dir_bundle(&token, &target, Priority::Normal))
            .unwrap();
    }
    for i in (0..8).step_by(2) {
        q.remove_bundle(&format!("b{i}"), &mut persister);
    }

    assert_eq!(q.bundle_count(), 4);
    for i in 0..8 {
        let token = format!("b{i}");
        let present = q.find_bundle(&token).is_some();
        assert_eq!(present, i % 2 == 1);
        assert_eq!(q.is_scheduled(&token), present);
    }
    // the survivors are still selectable
    assert!(pick(&mut q, &cfg).is_some());
}
