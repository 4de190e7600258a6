//! Viewport visibility watcher
//!
//! The host reports intersection changes for the content-bearing elements
//! registered here. An element coming into view boosts the queued
//! annotations correlated with it.

use std::collections::HashSet;

use crate::config::WatcherConfig;
use crate::dom::{Document, MutationRecord, NodeId};
use crate::highlight::Painter;

/// An intersection change reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub is_intersecting: bool,
}

#[derive(Debug)]
pub struct VisibilityWatcher {
    tags: Vec<String>,
    root_margin_px: u32,
    observed: HashSet<NodeId>,
}

impl VisibilityWatcher {
    pub fn new(config: &WatcherConfig) -> Self {
        Self {
            tags: config.observed_tags.clone(),
            root_margin_px: config.root_margin_px,
            observed: HashSet::new(),
        }
    }

    /// Margin the host should apply around the viewport, in CSS syntax
    pub fn root_margin(&self) -> String {
        format!("{}px", self.root_margin_px)
    }

    fn is_content_element(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node)
            .map(|tag| self.tags.iter().any(|t| t == tag))
            .unwrap_or(false)
    }

    /// Register every content element in `root`'s subtree (inclusive).
    /// Returns how many were newly registered.
    pub fn observe_subtree(&mut self, doc: &Document, root: NodeId) -> usize {
        let mut added = 0;
        for node in std::iter::once(root).chain(doc.descendants(root)) {
            if self.is_content_element(doc, node) && self.observed.insert(node) {
                added += 1;
            }
        }
        added
    }

    pub fn observe_document(&mut self, doc: &Document) -> usize {
        self.observe_subtree(doc, doc.body())
    }

    /// Follow tree changes: register added content, forget removed nodes
    pub fn track(&mut self, doc: &Document, records: &[MutationRecord]) {
        for record in records {
            for &removed in &record.removed {
                self.observed.remove(&removed);
                for node in doc.descendants(removed) {
                    self.observed.remove(&node);
                }
            }
            for &added in &record.added {
                if doc.is_connected(added) {
                    self.observe_subtree(doc, added);
                }
            }
        }
    }

    pub fn is_observed(&self, node: NodeId) -> bool {
        self.observed.contains(&node)
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Annotation ids correlated with observed elements that came into view
    pub fn visible_annotations(
        &self,
        doc: &Document,
        painter: &Painter,
        entries: &[IntersectionEntry],
    ) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for entry in entries {
            if !entry.is_intersecting || !self.is_observed(entry.target) {
                continue;
            }
            for id in painter.correlated_ids(doc, entry.target) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_xhtml;

    #[test]
    fn test_registers_content_elements() {
        let doc = parse_xhtml(
            r#"<body><h1>Title</h1><ul><li>item</li></ul><p>text <span>inline</span></p><img src="a.png"/></body>"#,
        )
        .unwrap();
        let mut watcher = VisibilityWatcher::new(&WatcherConfig::default());

        assert_eq!(watcher.observe_document(&doc), 4);
        assert!(watcher.is_observed(doc.elements_by_tag("h1")[0]));
        assert!(!watcher.is_observed(doc.elements_by_tag("li")[0]));
        assert_eq!(watcher.observe_document(&doc), 0);
        assert_eq!(watcher.root_margin(), "200px");
    }

    #[test]
    fn test_tracks_added_and_removed() {
        let mut doc = parse_xhtml("<body><div><p>a</p></div></body>").unwrap();
        let mut observer = doc.observe();
        let mut watcher = VisibilityWatcher::new(&WatcherConfig::default());
        watcher.observe_document(&doc);
        assert_eq!(watcher.observed_count(), 2);

        let body = doc.body();
        let p = doc.create_element("p");
        doc.append_child(body, p);
        let div = doc.elements_by_tag("div")[0];
        doc.remove(div);

        watcher.track(&doc, &observer.take_records());
        assert!(watcher.is_observed(p));
        assert!(!watcher.is_observed(div));
        assert_eq!(watcher.observed_count(), 1);
    }

    #[test]
    fn test_visible_correlated_annotations() {
        let doc = parse_xhtml(
            r#"<body><p>plain</p><p>has <span data-annotation-id="x">marked</span> text</p></body>"#,
        )
        .unwrap();
        let mut watcher = VisibilityWatcher::new(&WatcherConfig::default());
        watcher.observe_document(&doc);
        let painter = Painter::default();
        let paragraphs = doc.elements_by_tag("p");

        let entries = [
            IntersectionEntry { target: paragraphs[0], is_intersecting: true },
            IntersectionEntry { target: paragraphs[1], is_intersecting: true },
        ];
        assert_eq!(watcher.visible_annotations(&doc, &painter, &entries), vec!["x".to_string()]);

        let leaving = [IntersectionEntry { target: paragraphs[1], is_intersecting: false }];
        assert!(watcher.visible_annotations(&doc, &painter, &leaving).is_empty());
    }
}
