//! Structural paths
//!
//! Encodes a boundary point as `{tag, index}` steps from the body down to
//! its container plus a leaf step, and walks such a path back down.
//!
//! Element indices skip script/style/iframe siblings so injected scripts and
//! embeds do not shift existing paths. Highlight decorations (elements that
//! carry the decoration attribute) are transparent: their contents count as
//! children of the decoration's parent, and a text leaf is a run of adjacent
//! text nodes with offsets into the merged run. A decorated page therefore
//! yields the same paths as the undecorated one. Encode and resolve use the
//! same counting rules.

use crate::dom::{is_skipped_tag, BoundaryPoint, Document, LiveRange, NodeId};

use super::types::{LeafStep, NodePath, PathStep, StructuralRange};

fn is_decoration(doc: &Document, node: NodeId, attribute: &str) -> bool {
    doc.attr(node, attribute).is_some()
}

fn flatten(doc: &Document, parent: NodeId, attribute: &str, out: &mut Vec<NodeId>) {
    for &child in doc.children(parent) {
        if is_decoration(doc, child, attribute) {
            flatten(doc, child, attribute, out);
        } else {
            out.push(child);
        }
    }
}

/// Children of `parent` with decorations replaced by their contents
fn logical_children(doc: &Document, parent: NodeId, attribute: &str) -> Vec<NodeId> {
    let mut children = Vec::new();
    flatten(doc, parent, attribute, &mut children);
    children
}

/// Closest proper ancestor that is not a decoration
fn logical_parent(doc: &Document, node: NodeId, attribute: &str) -> Option<NodeId> {
    let parent = doc.parent(node)?;
    doc.closest(parent, |d, n| !is_decoration(d, n, attribute))
}

/// Element children that take part in path indexing
fn indexed_children(doc: &Document, parent: NodeId, attribute: &str) -> Vec<NodeId> {
    logical_children(doc, parent, attribute)
        .into_iter()
        .filter(|&c| doc.tag(c).map(|tag| !is_skipped_tag(tag)).unwrap_or(false))
        .collect()
}

/// Runs of adjacent text nodes among the logical children
fn text_runs(doc: &Document, parent: NodeId, attribute: &str) -> Vec<Vec<NodeId>> {
    let mut runs: Vec<Vec<NodeId>> = Vec::new();
    let mut open = false;
    for child in logical_children(doc, parent, attribute) {
        if !doc.is_text(child) {
            open = false;
            continue;
        }
        if open {
            if let Some(run) = runs.last_mut() {
                run.push(child);
                continue;
            }
        }
        runs.push(vec![child]);
        open = true;
    }
    runs
}

fn char_len(doc: &Document, node: NodeId) -> usize {
    doc.text(node).map(|t| t.chars().count()).unwrap_or(0)
}

/// Number of logical children of `container` before the gap at `point`
fn logical_offset(doc: &Document, container: NodeId, point: BoundaryPoint, attribute: &str) -> Option<usize> {
    fn walk(
        doc: &Document,
        parent: NodeId,
        point: BoundaryPoint,
        attribute: &str,
        count: &mut usize,
    ) -> Option<usize> {
        let children = doc.children(parent);
        for (i, &child) in children.iter().enumerate() {
            if parent == point.node && i == point.offset {
                return Some(*count);
            }
            if is_decoration(doc, child, attribute) {
                if let Some(found) = walk(doc, child, point, attribute, count) {
                    return Some(found);
                }
            } else {
                *count += 1;
            }
        }
        (parent == point.node && point.offset == children.len()).then_some(*count)
    }

    let mut count = 0;
    walk(doc, container, point, attribute, &mut count)
}

/// Encode one boundary point. `None` when the node is not inside the body.
///
/// `decoration_attribute` names the attribute carried by highlight
/// decorations, which the path looks through.
pub fn encode_point(doc: &Document, point: BoundaryPoint, decoration_attribute: &str) -> Option<NodePath> {
    let attribute = decoration_attribute;
    let body = doc.body();
    let (container, leaf) = if doc.is_text(point.node) {
        let parent = logical_parent(doc, point.node, attribute)?;
        let runs = text_runs(doc, parent, attribute);
        let (index, run) = runs
            .iter()
            .enumerate()
            .find(|(_, run)| run.contains(&point.node))?;
        let before: usize = run
            .iter()
            .take_while(|&&t| t != point.node)
            .map(|&t| char_len(doc, t))
            .sum();
        (
            parent,
            LeafStep::Text {
                index,
                offset: before + point.offset,
            },
        )
    } else {
        let container = if is_decoration(doc, point.node, attribute) {
            logical_parent(doc, point.node, attribute)?
        } else {
            point.node
        };
        let offset = logical_offset(doc, container, point, attribute)?;
        (container, LeafStep::Element { offset })
    };

    let mut steps = Vec::new();
    let mut current = container;
    while current != body {
        let parent = logical_parent(doc, current, attribute)?;
        let tag = doc.tag(current)?;
        if is_skipped_tag(tag) {
            return None;
        }
        let index = indexed_children(doc, parent, attribute)
            .iter()
            .position(|&c| c == current)?;
        steps.push(PathStep {
            tag: tag.to_string(),
            index,
        });
        current = parent;
    }
    steps.reverse();

    Some(NodePath { steps, leaf })
}

/// Encode both ends of a range
pub fn encode_range(doc: &Document, range: &LiveRange, decoration_attribute: &str) -> Option<StructuralRange> {
    Some(StructuralRange {
        start_path: encode_point(doc, range.start, decoration_attribute)?,
        end_path: encode_point(doc, range.end, decoration_attribute)?,
    })
}

/// Walk a path down from the body.
///
/// Fails when a step index is out of range, a step's tag no longer matches,
/// or the leaf offset is past the end of its text run.
pub fn resolve_point(doc: &Document, path: &NodePath, decoration_attribute: &str) -> Option<BoundaryPoint> {
    let attribute = decoration_attribute;
    let mut current = doc.body();
    for step in &path.steps {
        let child = *indexed_children(doc, current, attribute).get(step.index)?;
        if doc.tag(child) != Some(step.tag.as_str()) {
            return None;
        }
        current = child;
    }

    match path.leaf {
        LeafStep::Text { index, offset } => {
            let runs = text_runs(doc, current, attribute);
            let mut remaining = offset;
            for &text in runs.get(index)? {
                let len = char_len(doc, text);
                if remaining <= len {
                    return Some(BoundaryPoint::new(text, remaining));
                }
                remaining -= len;
            }
            None
        }
        LeafStep::Element { offset } => {
            let children = logical_children(doc, current, attribute);
            match children.get(offset) {
                Some(&child) => Some(BoundaryPoint::new(doc.parent(child)?, doc.child_index(child)?)),
                None if offset == children.len() => {
                    Some(BoundaryPoint::new(current, doc.children(current).len()))
                }
                None => None,
            }
        }
    }
}

/// Walk both ends of a structural range
pub fn resolve_range(doc: &Document, range: &StructuralRange, decoration_attribute: &str) -> Option<LiveRange> {
    Some(LiveRange::new(
        resolve_point(doc, &range.start_path, decoration_attribute)?,
        resolve_point(doc, &range.end_path, decoration_attribute)?,
    ))
}
