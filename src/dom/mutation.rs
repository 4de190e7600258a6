//! Mutation records and the owned observer subscription

use tokio::sync::mpsc;

use super::document::NodeId;

/// One child-list change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent whose child list changed
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Owned subscription to a document's child-list mutations.
///
/// Records are queued until read. Dropping (or [`disconnect`](Self::disconnect)ing)
/// the observer ends the subscription; the document prunes it on the next edit.
#[derive(Debug)]
pub struct MutationObserver {
    rx: mpsc::UnboundedReceiver<MutationRecord>,
}

impl MutationObserver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<MutationRecord>) -> Self {
        Self { rx }
    }

    /// Wait for the next record. Returns `None` once the document is gone.
    pub async fn recv(&mut self) -> Option<MutationRecord> {
        self.rx.recv().await
    }

    /// Drain every record queued so far without waiting
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            records.push(record);
        }
        records
    }

    /// Stop observing
    pub fn disconnect(mut self) {
        self.rx.close();
    }
}
