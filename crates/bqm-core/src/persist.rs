//! Persistence boundary for bundles.
//!
//! The on-disk bundle format is owned by the caller; the queue only needs a
//! save/delete contract so it can flush dirty bundles and drop removed ones.
//! Failures are per-bundle: `save_queue` logs and moves on.

use std::io;

use crate::bundle::Bundle;

/// Saves and deletes the persisted representation of a bundle.
pub trait QueuePersister {
    /// Writes the bundle's current state. A successful save clears the
    /// bundle's dirty flag (done by the caller).
    fn save(&mut self, bundle: &Bundle) -> io::Result<()>;

    /// Removes the bundle's persisted file after the bundle leaves the
    /// queue.
    fn delete(&mut self, bundle: &Bundle) -> io::Result<()>;
}
