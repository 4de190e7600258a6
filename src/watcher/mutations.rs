//! Structural mutation watcher
//!
//! Content appearing under the body while annotations are still queued arms
//! a throttle; when it elapses the session drains again. Bursts of
//! mutations inside the throttle window collapse into one re-drain.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::WatcherConfig;
use crate::dom::{is_skipped_tag, Document, MutationObserver, MutationRecord, NodeId};

/// Whether an added node can make a queued annotation resolvable
fn is_content_node(doc: &Document, node: NodeId) -> bool {
    if !doc.contains(doc.body(), node) {
        return false;
    }
    let in_skipped = doc
        .closest(node, |d, n| d.tag(n).map(is_skipped_tag).unwrap_or(false))
        .is_some();
    if in_skipped {
        return false;
    }
    match doc.tag(node) {
        None => doc.text(node).map(|t| !t.trim().is_empty()).unwrap_or(false),
        Some("img") => true,
        Some(_) => {
            !doc.text_content(node).trim().is_empty()
                || doc.descendants(node).into_iter().any(|n| doc.tag(n) == Some("img"))
        }
    }
}

/// Whether a record adds anything worth re-draining for
pub fn qualifies(doc: &Document, record: &MutationRecord) -> bool {
    record.added.iter().any(|&node| is_content_node(doc, node))
}

/// Owned mutation subscription plus the re-drain throttle
#[derive(Debug)]
pub struct MutationWatcher {
    observer: MutationObserver,
    throttle: Duration,
    deadline: Option<Instant>,
}

impl MutationWatcher {
    pub fn new(observer: MutationObserver, config: &WatcherConfig) -> Self {
        Self {
            observer,
            throttle: Duration::from_millis(config.mutation_throttle_ms),
            deadline: None,
        }
    }

    /// Wait for the next mutation record
    pub async fn next_record(&mut self) -> Option<MutationRecord> {
        self.observer.recv().await
    }

    /// Records queued so far, without waiting
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        self.observer.take_records()
    }

    /// Look at new records; arms the throttle when one qualifies and work
    /// is queued. Returns whether the throttle is armed.
    pub fn note(&mut self, doc: &Document, records: &[MutationRecord], work_queued: bool) -> bool {
        if self.deadline.is_none() && work_queued && records.iter().any(|r| qualifies(doc, r)) {
            debug!("Page content changed, re-draining in {:?}", self.throttle);
            self.deadline = Some(Instant::now() + self.throttle);
        }
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm the throttle; true if it was armed
    pub fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}
