//! Per-volume projection of queued disk usage.

use std::collections::HashMap;

use crate::config::QueueConfig;
use crate::pathing;

use super::BundleMap;

/// Longest volume root that contains `path`.
pub(crate) fn mount_path<'a>(path: &str, volumes: &'a [String]) -> Option<&'a str> {
    volumes
        .iter()
        .filter(|v| pathing::is_parent_or_exact(v, path))
        .max_by_key(|v| pathing::segments(v).count())
        .map(String::as_str)
}

/// Subtracts every bundle's queued bytes from its volume's free-space
/// figure. Keys of `free_by_volume` are the known volume roots.
///
/// With a single shared temp directory (no per-drive placeholder in the
/// template), a bundle on a different volume than the temp one only claims
/// its not-yet-downloaded bytes there; on the temp volume itself, or
/// without a shared temp directory, each incomplete item claims its full
/// size since that space is reserved upfront.
pub(crate) fn project(
    bundles: &BundleMap,
    free_by_volume: &mut HashMap<String, i64>,
    cfg: &QueueConfig,
) {
    let volumes: Vec<String> = free_by_volume.keys().cloned().collect();
    let single_temp = cfg.single_temp_directory();
    let temp_volume = if single_temp {
        mount_path(&cfg.temp_download_directory, &volumes).map(str::to_string)
    } else {
        None
    };

    for bundle in bundles.values() {
        let Some(vol) = mount_path(bundle.target(), &volumes) else {
            continue;
        };
        let reserve_full = !single_temp || temp_volume.as_deref() == Some(vol);
        let use_bytes = bundle.queued_disk_use(reserve_full) as i64;
        let vol = vol.to_string();
        if let Some(free) = free_by_volume.get_mut(&vol) {
            *free -= use_bytes;
        }
    }
}
