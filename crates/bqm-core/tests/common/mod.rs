//! Shared fixtures for queue integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use bqm_core::bundle::{Bundle, BundleStatus, Priority, QueueItem};
use bqm_core::persist::QueuePersister;

pub const ADDED_AT: u64 = 10_000;

/// Queued directory bundle with one item directly in its root.
pub fn dir_bundle(token: &str, target: &str, priority: Priority) -> Bundle {
    let mut b = empty_dir_bundle(token, target, priority);
    b.add_queue_item(QueueItem::new(format!(r"{target}\{token}.bin"), 1_000));
    b
}

/// Queued directory bundle with no items yet.
pub fn empty_dir_bundle(token: &str, target: &str, priority: Priority) -> Bundle {
    let mut b = Bundle::directory(token, target, priority, ADDED_AT);
    b.set_status(BundleStatus::Queued);
    b
}

/// Queued single-file bundle.
pub fn file_bundle(token: &str, path: &str, priority: Priority) -> Bundle {
    let mut b = Bundle::single_file(token, QueueItem::new(path, 1_000), priority, ADDED_AT);
    b.set_status(BundleStatus::Queued);
    b
}

/// In-memory persister recording save/delete calls; selected tokens fail.
#[derive(Default)]
pub struct MemPersister {
    pub saved: Vec<String>,
    pub deleted: Vec<String>,
    pub fail_tokens: HashSet<String>,
}

impl MemPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(tokens: &[&str]) -> Self {
        Self {
            fail_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl QueuePersister for MemPersister {
    fn save(&mut self, bundle: &Bundle) -> io::Result<()> {
        if self.fail_tokens.contains(bundle.token()) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.saved.push(bundle.token().to_string());
        Ok(())
    }

    fn delete(&mut self, bundle: &Bundle) -> io::Result<()> {
        self.deleted.push(bundle.token().to_string());
        Ok(())
    }
}

/// Persister writing one marker file per bundle under `dir`.
pub struct FilePersister {
    pub dir: PathBuf,
}

impl FilePersister {
    pub fn bundle_file(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.bundle"))
    }
}

impl QueuePersister for FilePersister {
    fn save(&mut self, bundle: &Bundle) -> io::Result<()> {
        std::fs::write(self.bundle_file(bundle.token()), bundle.target())
    }

    fn delete(&mut self, bundle: &Bundle) -> io::Result<()> {
        match std::fs::remove_file(self.bundle_file(bundle.token())) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
