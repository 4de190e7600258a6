//! Priority work queue
//!
//! Priorities only ever grow while an item is queued. Popping sorts by
//! priority (highest first); the sort is stable, so equal priorities keep
//! their queue order and re-queued items go behind their peers.

use crate::annotations::Annotation;

/// One annotation waiting to be resolved and painted
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub annotation: Annotation,
    pub priority: u64,
    /// Failed resolve/paint attempts so far
    pub attempts: u32,
}

impl QueueItem {
    pub fn new(annotation: Annotation, priority: u64) -> Self {
        Self {
            annotation,
            priority,
            attempts: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.annotation.id
    }
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Vec<QueueItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn push(&mut self, item: QueueItem) {
        self.items.push(item);
    }

    pub fn push_front(&mut self, item: QueueItem) {
        self.items.insert(0, item);
    }

    /// Add `amount` to an item's priority, saturating. False if not queued.
    pub fn boost(&mut self, id: &str, amount: u64) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                item.priority = item.priority.saturating_add(amount);
                true
            }
            None => false,
        }
    }

    /// Raise an item's priority to at least `priority`. False if not queued.
    pub fn raise(&mut self, id: &str, priority: u64) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                item.priority = item.priority.max(priority);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        let position = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(position))
    }

    /// Sort by priority and take up to `size` items from the top
    pub fn pop_batch(&mut self, size: usize) -> Vec<QueueItem> {
        self.items.sort_by(|a, b| b.priority.cmp(&a.priority));
        let take = size.min(self.items.len());
        self.items.drain(..take).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(QueueItem::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::TextAnchor;

    fn item(text: &str, priority: u64) -> QueueItem {
        QueueItem::new(
            Annotation::new_text("https://ex.com/a", TextAnchor::from_text(text)),
            priority,
        )
    }

    #[test]
    fn test_pop_batch_by_priority_then_order() {
        let mut queue = WorkQueue::new();
        let items = [item("a", 0), item("b", 5), item("c", 0), item("d", 5)];
        let ids: Vec<String> = items.iter().map(|i| i.id().to_string()).collect();
        for i in items {
            queue.push(i);
        }

        let batch = queue.pop_batch(3);
        let popped: Vec<&str> = batch.iter().map(QueueItem::id).collect();
        assert_eq!(popped, vec![ids[1].as_str(), ids[3].as_str(), ids[0].as_str()]);
        assert_eq!(queue.ids(), vec![ids[2].as_str()]);
    }

    #[test]
    fn test_boost_saturates() {
        let mut queue = WorkQueue::new();
        let first = item("a", u64::MAX - 1);
        let id = first.id().to_string();
        queue.push(first);

        assert!(queue.boost(&id, 50));
        assert_eq!(queue.get(&id).unwrap().priority, u64::MAX);
        assert!(!queue.boost("missing", 50));
    }

    #[test]
    fn test_raise_never_lowers() {
        let mut queue = WorkQueue::new();
        let first = item("a", 100);
        let id = first.id().to_string();
        queue.push(first);

        queue.raise(&id, 10);
        assert_eq!(queue.get(&id).unwrap().priority, 100);
        queue.raise(&id, 1000);
        assert_eq!(queue.get(&id).unwrap().priority, 1000);
    }
}
