//! Arena-backed document tree
//!
//! Nodes live in a single arena and are addressed by [`NodeId`]. Detaching a
//! node keeps its subtree intact, so a detached node can still be inspected
//! (its `is_connected` is simply false), mirroring how live DOM nodes behave
//! after removal.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::mutation::{MutationObserver, MutationRecord};

/// A document shared between the session task and the host.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index of this node
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Element with a lower-cased tag name and ordered attributes
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    /// Text node
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// How a scroll request animates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    Auto,
    Smooth,
}

/// Vertical alignment of a scroll request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBlock {
    Start,
    Center,
    End,
    Nearest,
}

/// The last scroll-into-view request issued against the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub node: NodeId,
    pub behavior: ScrollBehavior,
    pub block: ScrollBlock,
}

/// The live document
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    observers: Vec<mpsc::UnboundedSender<MutationRecord>>,
    last_scroll: Option<ScrollRequest>,
}

impl Document {
    /// Create an empty `<html><body></body></html>` document
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            observers: Vec::new(),
            last_scroll: None,
        };
        let root = doc.alloc(NodeData::Element {
            tag: "html".to_string(),
            attrs: Vec::new(),
        });
        let body = doc.alloc(NodeData::Element {
            tag: "body".to_string(),
            attrs: Vec::new(),
        });
        doc.nodes[body.0].parent = Some(root);
        doc.nodes[root.0].children.push(body);
        doc.root = root;
        doc.body = body;
        doc
    }

    /// Wrap this document for sharing with a session
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// The `<html>` element
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element
    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Element { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Text(_))
    }

    /// Tag name of an element node
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    /// Value of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Text(value) => Some(value.as_str()),
            NodeData::Element { .. } => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Position of `child` among its parent's children
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|&c| c == child)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id.0].data {
            match attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id.0].data {
            attrs.retain(|(key, _)| key != name);
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) || !self.is_element(id) {
            return;
        }
        let classes = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", &classes);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attr(id, "class") else {
            return;
        };
        let remaining: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
        if remaining.is_empty() {
            self.remove_attr(id, "class");
        } else {
            let joined = remaining.join(" ");
            self.set_attr(id, "class", &joined);
        }
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, value: &str) -> NodeId {
        self.alloc(NodeData::Text(value.to_string()))
    }

    /// Replace the value of a text node
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let NodeData::Text(existing) = &mut self.nodes[id.0].data {
            *existing = value.to_string();
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference` (or last when `None`).
    ///
    /// A child that is already in the tree is moved, not copied.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if child == parent || self.contains(child, parent) {
            return;
        }
        if self.parent(child).is_some() {
            self.remove(child);
        }
        let position = reference
            .and_then(|r| self.children(parent).iter().position(|&c| c == r))
            .unwrap_or(self.children(parent).len());
        self.nodes[parent.0].children.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
        self.notify(MutationRecord {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        self.notify(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![id],
        });
    }

    /// Split a text node at a character offset.
    ///
    /// The original node keeps the head; the returned node holds the tail
    /// and is inserted right after it. Returns `None` for non-text nodes or
    /// an offset past the end.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Option<NodeId> {
        let value = self.text(id)?.to_string();
        if offset > value.chars().count() {
            return None;
        }
        let at = char_to_byte(&value, offset);
        let (head, tail) = value.split_at(at);
        let tail_node = self.create_text(tail);
        self.set_text(id, head);
        if let Some(parent) = self.parent(id) {
            let next = self
                .child_index(id)
                .and_then(|i| self.children(parent).get(i + 1).copied());
            self.insert_before(parent, tail_node, next);
        }
        Some(tail_node)
    }

    /// Merge adjacent text children of `parent` and drop empty ones
    pub fn normalize(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        let mut previous_text: Option<NodeId> = None;
        for child in children {
            let Some(value) = self.text(child).map(str::to_string) else {
                previous_text = None;
                continue;
            };
            match previous_text {
                Some(prev) => {
                    let merged = format!("{}{}", self.text(prev).unwrap_or_default(), value);
                    self.set_text(prev, &merged);
                    self.remove(child);
                }
                None if value.is_empty() => self.remove(child),
                None => previous_text = Some(child),
            }
        }
    }

    /// Whether `ancestor` contains `node` (a node does not contain itself)
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is attached to the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.root || self.contains(self.root, id)
    }

    /// Closest inclusive ancestor satisfying `predicate`
    pub fn closest(&self, id: NodeId, predicate: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if predicate(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Pre-order descendants of `id`, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Concatenated value of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(value) = self.text(id) {
            return value.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// First connected element whose `id` attribute equals `element_id`
    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(element_id))
    }

    /// Connected elements with the given tag, in document order
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&n| self.tag(n) == Some(tag))
            .collect()
    }

    /// Connected elements carrying `name="value"`, in document order
    pub fn elements_with_attr(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&n| self.attr(n, name) == Some(value))
            .collect()
    }

    /// Subscribe to tree mutations. Dropping the observer unsubscribes.
    pub fn observe(&mut self) -> MutationObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        MutationObserver::new(rx)
    }

    fn notify(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        self.observers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    /// Number of live mutation subscriptions
    pub fn observer_count(&self) -> usize {
        self.observers.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Ask the viewport to bring `node` into view
    pub fn scroll_into_view(&mut self, node: NodeId, behavior: ScrollBehavior, block: ScrollBlock) {
        self.last_scroll = Some(ScrollRequest {
            node,
            behavior,
            block,
        });
    }

    pub fn last_scroll(&self) -> Option<ScrollRequest> {
        self.last_scroll
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte index of the `offset`-th character (or the string length)
pub(crate) fn char_to_byte(value: &str, offset: usize) -> usize {
    value
        .char_indices()
        .nth(offset)
        .map(|(byte, _)| byte)
        .unwrap_or(value.len())
}

/// Character count of the prefix ending at byte `index`
pub(crate) fn byte_to_char(value: &str, index: usize) -> usize {
    value[..index.min(value.len())].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(doc: &mut Document, text: &str) -> (NodeId, NodeId) {
        let p = doc.create_element("p");
        let t = doc.create_text(text);
        doc.append_child(p, t);
        let body = doc.body();
        doc.append_child(body, p);
        (p, t)
    }

    #[test]
    fn test_split_and_normalize() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "héllo world");

        let tail = doc.split_text(t, 5).unwrap();
        assert_eq!(doc.text(t), Some("héllo"));
        assert_eq!(doc.text(tail), Some(" world"));
        assert_eq!(doc.children(p), &[t, tail]);

        doc.normalize(p);
        assert_eq!(doc.children(p), &[t]);
        assert_eq!(doc.text(t), Some("héllo world"));
    }

    #[test]
    fn test_split_out_of_range() {
        let mut doc = Document::new();
        let (_, t) = paragraph(&mut doc, "abc");
        assert!(doc.split_text(t, 4).is_none());
        assert_eq!(doc.text(t), Some("abc"));
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let mut doc = Document::new();
        let (p, t) = paragraph(&mut doc, "gone");
        assert!(doc.is_connected(t));

        doc.remove(p);
        assert!(!doc.is_connected(p));
        assert!(!doc.is_connected(t));
        assert_eq!(doc.text_content(p), "gone");
    }

    #[test]
    fn test_insert_moves_existing_node() {
        let mut doc = Document::new();
        let (p1, t) = paragraph(&mut doc, "moving");
        let (p2, _) = paragraph(&mut doc, "target");

        doc.insert_before(p2, t, None);
        assert!(doc.children(p1).is_empty());
        assert_eq!(doc.parent(t), Some(p2));
    }

    #[test]
    fn test_classes() {
        let mut doc = Document::new();
        let (p, _) = paragraph(&mut doc, "x");
        doc.add_class(p, "a");
        doc.add_class(p, "b");
        doc.add_class(p, "a");
        assert_eq!(doc.attr(p, "class"), Some("a b"));

        doc.remove_class(p, "a");
        assert_eq!(doc.attr(p, "class"), Some("b"));
        doc.remove_class(p, "b");
        assert_eq!(doc.attr(p, "class"), None);
    }

    #[test]
    fn test_get_element_by_id_ignores_detached() {
        let mut doc = Document::new();
        let (p, _) = paragraph(&mut doc, "x");
        doc.set_attr(p, "id", "para");
        assert_eq!(doc.get_element_by_id("para"), Some(p));

        doc.remove(p);
        assert_eq!(doc.get_element_by_id("para"), None);
    }

    #[test]
    fn test_observer_receives_records_until_dropped() {
        let mut doc = Document::new();
        let mut observer = doc.observe();
        let (p, _) = paragraph(&mut doc, "x");

        let records = observer.take_records();
        assert!(records.iter().any(|r| r.added.contains(&p)));

        drop(observer);
        paragraph(&mut doc, "y");
        assert_eq!(doc.observer_count(), 0);
    }
}
