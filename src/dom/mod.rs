//! Live document model
//!
//! The anchoring core reads and decorates an owned document tree rather than
//! host node references. Hosts hand over XHTML snapshots (or build trees
//! programmatically), forward viewport events, and read the decorated markup
//! back.

mod document;
mod mutation;
mod parser;
mod range;

pub use document::{
    Document, NodeData, NodeId, ScrollBehavior, ScrollBlock, ScrollRequest, SharedDocument,
};
pub(crate) use document::{byte_to_char, char_to_byte};
pub use mutation::{MutationObserver, MutationRecord};
pub use parser::{inner_html, outer_html, parse_xhtml, ParseError};
pub use range::{BoundaryPoint, LiveRange, TextSegment};

/// Elements whose content never takes part in anchoring
pub const SKIPPED_TAGS: &[&str] = &["script", "style", "iframe"];

pub fn is_skipped_tag(tag: &str) -> bool {
    SKIPPED_TAGS.contains(&tag)
}
