//! Case-insensitive text search over the visible text of a document

use regex::{Regex, RegexBuilder};

use crate::dom::{byte_to_char, is_skipped_tag, BoundaryPoint, Document, LiveRange, NodeId};

/// Options for a library-backed text search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions {
    pub case_sensitive: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
        }
    }
}

fn literal_pattern(needle: &str, case_sensitive: bool) -> Option<Regex> {
    if needle.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(!case_sensitive)
        .build()
        .ok()
}

/// Text nodes under the body that are not inside script/style/iframe
pub fn visible_text_nodes(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.body())
        .into_iter()
        .filter(|&n| doc.is_text(n))
        .filter(|&n| {
            doc.closest(n, |d, id| d.tag(id).map(is_skipped_tag).unwrap_or(false))
                .is_none()
        })
        .collect()
}

/// First occurrence of `needle` inside a single visible text node.
///
/// Matches never span node boundaries.
pub fn find_in_text_nodes(doc: &Document, needle: &str) -> Option<LiveRange> {
    let pattern = literal_pattern(needle, false)?;
    visible_text_nodes(doc).into_iter().find_map(|node| {
        let value = doc.text(node)?;
        let found = pattern.find(value)?;
        Some(LiveRange::within_text(
            node,
            byte_to_char(value, found.start()),
            byte_to_char(value, found.end()),
        ))
    })
}

/// First occurrence of `needle` in the concatenated visible text, which may
/// span several text nodes.
pub fn find_across_nodes(doc: &Document, needle: &str, options: FindOptions) -> Option<LiveRange> {
    let pattern = literal_pattern(needle, options.case_sensitive)?;

    // (node, first char in the concatenation, char length)
    let mut spans: Vec<(NodeId, usize, usize)> = Vec::new();
    let mut haystack = String::new();
    let mut cursor = 0;
    for node in visible_text_nodes(doc) {
        let value = doc.text(node).unwrap_or_default();
        let len = value.chars().count();
        spans.push((node, cursor, len));
        haystack.push_str(value);
        cursor += len;
    }

    let found = pattern.find(&haystack)?;
    let start = byte_to_char(&haystack, found.start());
    let end = byte_to_char(&haystack, found.end());

    let (start_node, start_base, _) = *spans
        .iter()
        .find(|&&(_, base, len)| start >= base && start < base + len)?;
    let (end_node, end_base, _) = *spans
        .iter()
        .find(|&&(_, base, len)| end > base && end <= base + len)?;

    Some(LiveRange::new(
        BoundaryPoint::new(start_node, start - start_base),
        BoundaryPoint::new(end_node, end - end_base),
    ))
}
