//! Live ranges over a [`Document`]
//!
//! Boundary offsets follow DOM rules: a character offset inside a text node,
//! a child offset inside an element.

use serde::{Deserialize, Serialize};

use super::document::{Document, NodeId};
use super::is_skipped_tag;

/// One end of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl BoundaryPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A contiguous selection between two boundary points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRange {
    pub start: BoundaryPoint,
    pub end: BoundaryPoint,
}

/// The part of one text node covered by a range, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSegment {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

impl LiveRange {
    pub fn new(start: BoundaryPoint, end: BoundaryPoint) -> Self {
        Self { start, end }
    }

    /// Range covering `[start, end)` characters of a single text node
    pub fn within_text(node: NodeId, start: usize, end: usize) -> Self {
        Self {
            start: BoundaryPoint::new(node, start),
            end: BoundaryPoint::new(node, end),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Both boundary containers are still attached to the document
    pub fn is_attached(&self, doc: &Document) -> bool {
        doc.is_connected(self.start.node) && doc.is_connected(self.end.node)
    }

    /// Text nodes covered by the range, in document order.
    ///
    /// Text inside script/style elements is never part of the result.
    pub fn text_segments(&self, doc: &Document) -> Vec<TextSegment> {
        let order = doc.descendants(doc.root());
        let position = |node: NodeId| order.iter().position(|&n| n == node);

        let Some((start_index, start_offset)) = resolve_start(doc, &order, self.start, &position) else {
            return Vec::new();
        };
        let Some((end_index, end_offset)) = resolve_end(doc, &order, self.end, &position) else {
            return Vec::new();
        };
        if start_index > end_index {
            return Vec::new();
        }

        let mut segments = Vec::new();
        for (i, &node) in order.iter().enumerate().take(end_index + 1).skip(start_index) {
            let Some(value) = doc.text(node) else {
                continue;
            };
            if in_skipped_element(doc, node) {
                continue;
            }
            let len = value.chars().count();
            let from = if i == start_index { start_offset.min(len) } else { 0 };
            let to = if i == end_index { end_offset.min(len) } else { len };
            if from < to {
                segments.push(TextSegment {
                    node,
                    start: from,
                    end: to,
                });
            }
        }
        segments
    }

    /// The selected text
    pub fn text(&self, doc: &Document) -> String {
        self.text_segments(doc)
            .into_iter()
            .filter_map(|segment| {
                doc.text(segment.node).map(|value| {
                    value
                        .chars()
                        .skip(segment.start)
                        .take(segment.end - segment.start)
                        .collect::<String>()
                })
            })
            .collect()
    }
}

fn in_skipped_element(doc: &Document, node: NodeId) -> bool {
    doc.closest(node, |d, n| d.tag(n).map(is_skipped_tag).unwrap_or(false))
        .is_some()
}

/// First text position at or after the boundary: (pre-order index, char offset)
fn resolve_start(
    doc: &Document,
    order: &[NodeId],
    point: BoundaryPoint,
    position: &impl Fn(NodeId) -> Option<usize>,
) -> Option<(usize, usize)> {
    if doc.is_text(point.node) {
        return position(point.node).map(|i| (i, point.offset));
    }
    let from = element_gap(doc, order, point, position)?;
    order
        .iter()
        .enumerate()
        .skip(from)
        .find(|&(_, &n)| doc.is_text(n))
        .map(|(i, _)| (i, 0))
}

/// Last text position before the boundary: (pre-order index, char offset)
fn resolve_end(
    doc: &Document,
    order: &[NodeId],
    point: BoundaryPoint,
    position: &impl Fn(NodeId) -> Option<usize>,
) -> Option<(usize, usize)> {
    if doc.is_text(point.node) {
        return position(point.node).map(|i| (i, point.offset));
    }
    let until = element_gap(doc, order, point, position)?;
    order[..until]
        .iter()
        .enumerate()
        .rev()
        .find(|&(_, &n)| doc.is_text(n))
        .map(|(i, &n)| (i, doc.text(n).map(|v| v.chars().count()).unwrap_or(0)))
}

/// Pre-order index of the gap denoted by an element boundary point
fn element_gap(
    doc: &Document,
    order: &[NodeId],
    point: BoundaryPoint,
    position: &impl Fn(NodeId) -> Option<usize>,
) -> Option<usize> {
    let children = doc.children(point.node);
    if let Some(&child) = children.get(point.offset) {
        return position(child);
    }
    // Past the last child: the gap right after the element's subtree
    if point.node == doc.root() {
        return Some(order.len());
    }
    let base = position(point.node)?;
    Some(base + 1 + doc.descendants(point.node).len())
}
