//! Annotation store interface
//!
//! The extension keeps every annotation in one flat ordered collection.
//! Readers ask for a page's annotations; writers replace the collection and
//! every subscriber is told what it looked like before and after.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use super::types::Annotation;

/// Capacity of the change broadcast; slow subscribers see `Lagged`
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A write to the collection: the full list before and after
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub old: Vec<Annotation>,
    pub new: Vec<Annotation>,
}

impl StoreChange {
    /// Annotations present after the change but not before
    pub fn added(&self) -> Vec<&Annotation> {
        self.new
            .iter()
            .filter(|a| !self.old.iter().any(|o| o.id == a.id))
            .collect()
    }

    /// Ids present before the change but not after
    pub fn removed_ids(&self) -> Vec<&str> {
        self.old
            .iter()
            .filter(|o| !self.new.iter().any(|a| a.id == o.id))
            .map(|o| o.id.as_str())
            .collect()
    }
}

/// An edit applied to the whole collection while the store holds its
/// write lock. Returns whether anything changed; unchanged edits are not
/// written or broadcast.
pub type StoreEdit<'a> = Box<dyn FnOnce(&mut Vec<Annotation>) -> bool + Send + 'a>;

/// Persistent annotation collection
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Annotations whose page matches `page_url` (fragments ignored), in collection order
    async fn get(&self, page_url: &str) -> Result<Vec<Annotation>, StoreError>;

    /// The whole collection
    async fn all(&self) -> Result<Vec<Annotation>, StoreError>;

    /// Read, edit and write the collection as one step. Concurrent updates
    /// never lose each other's writes.
    async fn update(&self, edit: StoreEdit<'_>) -> Result<bool, StoreError>;

    /// Subscribe to collection changes
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Replace the whole collection
    async fn put(&self, annotations: Vec<Annotation>) -> Result<(), StoreError> {
        self.update(Box::new(move |current: &mut Vec<Annotation>| {
            *current = annotations;
            true
        }))
        .await?;
        Ok(())
    }

    /// Append one annotation to the collection
    async fn append(&self, annotation: Annotation) -> Result<(), StoreError> {
        self.update(Box::new(move |annotations: &mut Vec<Annotation>| {
            annotations.push(annotation);
            true
        }))
        .await?;
        Ok(())
    }

    /// Remove one annotation; returns whether it existed
    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        self.update(Box::new(move |annotations: &mut Vec<Annotation>| {
            let before = annotations.len();
            annotations.retain(|a| a.id != id);
            annotations.len() != before
        }))
        .await
    }
}

/// In-memory store, the default for a single browsing context
pub struct MemoryStore {
    annotations: RwLock<Vec<Annotation>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_annotations(Vec::new())
    }

    pub fn with_annotations(annotations: Vec<Annotation>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            annotations: RwLock::new(annotations),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn get(&self, page_url: &str) -> Result<Vec<Annotation>, StoreError> {
        let annotations = self.annotations.read().await;
        Ok(annotations
            .iter()
            .filter(|a| a.belongs_to(page_url))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Annotation>, StoreError> {
        Ok(self.annotations.read().await.clone())
    }

    async fn update(&self, edit: StoreEdit<'_>) -> Result<bool, StoreError> {
        let mut current = self.annotations.write().await;
        let old = current.clone();
        if !edit(&mut *current) {
            return Ok(false);
        }
        // Sent under the lock so subscribers see changes in write order.
        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            old,
            new: current.clone(),
        });
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
