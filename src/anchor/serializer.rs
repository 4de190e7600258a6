//! Range serialization capability
//!
//! A [`RangeSerializer`] turns a live range into an opaque string and back,
//! and can search for text on its own. The codec prefers it over structural
//! paths when one is installed.
//!
//! [`ChecksumRangeSerializer`] is the built-in implementation. Boundaries are
//! child-index paths from the body (`0/3/1:5`), and the pair is followed by a
//! checksum of the body markup: `start,end{checksum}`. Deserializing against
//! markup that no longer matches the checksum fails, letting the resolver
//! fall through to a more tolerant strategy.

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::search::{find_across_nodes, FindOptions};
use crate::dom::{inner_html, BoundaryPoint, Document, LiveRange, NodeId};

/// Hex characters of the markup digest kept in a serialization
const CHECKSUM_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("Malformed serialized range: {0}")]
    Malformed(String),

    #[error("Document checksum mismatch (expected {expected}, found {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Boundary not found: {0}")]
    NodeNotFound(String),
}

/// Pluggable range serialization
pub trait RangeSerializer: Send + Sync {
    /// Serialize a live range
    fn serialize(&self, doc: &Document, range: &LiveRange) -> Result<String, SerializeError>;

    /// Rebuild a live range from a serialization
    fn deserialize(&self, doc: &Document, serialized: &str) -> Result<LiveRange, SerializeError>;

    /// Search the document for `text`
    fn find_text(&self, doc: &Document, text: &str, options: FindOptions) -> Option<LiveRange>;
}

/// Child-index paths plus a markup checksum
#[derive(Debug, Clone, Default)]
pub struct ChecksumRangeSerializer;

impl ChecksumRangeSerializer {
    pub fn new() -> Self {
        Self
    }

    fn checksum(doc: &Document) -> String {
        let digest = Sha256::digest(inner_html(doc, doc.body()).as_bytes());
        let mut checksum = hex::encode(digest);
        checksum.truncate(CHECKSUM_LEN);
        checksum
    }

    fn serialize_point(doc: &Document, point: BoundaryPoint) -> Result<String, SerializeError> {
        let body = doc.body();
        let mut indices = Vec::new();
        let mut current = point.node;
        while current != body {
            let index = doc
                .child_index(current)
                .ok_or_else(|| SerializeError::NodeNotFound("boundary outside the body".into()))?;
            indices.push(index.to_string());
            current = doc
                .parent(current)
                .ok_or_else(|| SerializeError::NodeNotFound("boundary outside the body".into()))?;
        }
        indices.reverse();
        Ok(format!("{}:{}", indices.join("/"), point.offset))
    }

    fn deserialize_point(doc: &Document, part: &str) -> Result<BoundaryPoint, SerializeError> {
        let (path, offset) = part
            .rsplit_once(':')
            .ok_or_else(|| SerializeError::Malformed(part.to_string()))?;
        let offset: usize = offset
            .parse()
            .map_err(|_| SerializeError::Malformed(part.to_string()))?;

        let mut node: NodeId = doc.body();
        for step in path.split('/').filter(|s| !s.is_empty()) {
            let index: usize = step
                .parse()
                .map_err(|_| SerializeError::Malformed(part.to_string()))?;
            node = *doc
                .children(node)
                .get(index)
                .ok_or_else(|| SerializeError::NodeNotFound(part.to_string()))?;
        }

        let limit = match doc.text(node) {
            Some(value) => value.chars().count(),
            None => doc.children(node).len(),
        };
        if offset > limit {
            return Err(SerializeError::NodeNotFound(part.to_string()));
        }
        Ok(BoundaryPoint::new(node, offset))
    }
}

impl RangeSerializer for ChecksumRangeSerializer {
    fn serialize(&self, doc: &Document, range: &LiveRange) -> Result<String, SerializeError> {
        Ok(format!(
            "{},{}{{{}}}",
            Self::serialize_point(doc, range.start)?,
            Self::serialize_point(doc, range.end)?,
            Self::checksum(doc)
        ))
    }

    fn deserialize(&self, doc: &Document, serialized: &str) -> Result<LiveRange, SerializeError> {
        let malformed = || SerializeError::Malformed(serialized.to_string());

        let body = serialized.strip_suffix('}').ok_or_else(malformed)?;
        let (points, expected) = body.rsplit_once('{').ok_or_else(malformed)?;
        let actual = Self::checksum(doc);
        if expected != actual {
            return Err(SerializeError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }

        let (start, end) = points.split_once(',').ok_or_else(malformed)?;
        Ok(LiveRange::new(
            Self::deserialize_point(doc, start)?,
            Self::deserialize_point(doc, end)?,
        ))
    }

    fn find_text(&self, doc: &Document, text: &str, options: FindOptions) -> Option<LiveRange> {
        find_across_nodes(doc, text, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_xhtml;

    const MARKUP: &str = "<body><div><span>a</span><span>b</span><p>hello world</p></div></body>";

    fn hello_range(doc: &Document) -> LiveRange {
        let p = doc.elements_by_tag("p")[0];
        LiveRange::within_text(doc.children(p)[0], 0, 11)
    }

    #[test]
    fn test_serialize_format() {
        let doc = parse_xhtml(MARKUP).unwrap();
        let serialized = ChecksumRangeSerializer::new()
            .serialize(&doc, &hello_range(&doc))
            .unwrap();

        let (points, checksum) = serialized.split_once('{').unwrap();
        assert_eq!(points, "0/2/0:0,0/2/0:11");
        assert_eq!(checksum.len(), CHECKSUM_LEN + 1);
    }

    #[test]
    fn test_deserialize_on_reload() {
        let serializer = ChecksumRangeSerializer::new();
        let original = parse_xhtml(MARKUP).unwrap();
        let serialized = serializer.serialize(&original, &hello_range(&original)).unwrap();

        let reloaded = parse_xhtml(MARKUP).unwrap();
        let range = serializer.deserialize(&reloaded, &serialized).unwrap();
        assert_eq!(range.text(&reloaded), "hello world");
    }

    #[test]
    fn test_changed_markup_fails_checksum() {
        let serializer = ChecksumRangeSerializer::new();
        let original = parse_xhtml(MARKUP).unwrap();
        let serialized = serializer.serialize(&original, &hello_range(&original)).unwrap();

        let edited = parse_xhtml("<body><div><span>a</span><p>hello world</p></div></body>").unwrap();
        let err = serializer.deserialize(&edited, &serialized).unwrap_err();
        assert!(matches!(err, SerializeError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_malformed_input() {
        let serializer = ChecksumRangeSerializer::new();
        let doc = parse_xhtml(MARKUP).unwrap();
        let checksum = ChecksumRangeSerializer::checksum(&doc);

        assert!(matches!(
            serializer.deserialize(&doc, "garbage"),
            Err(SerializeError::Malformed(_))
        ));
        assert!(matches!(
            serializer.deserialize(&doc, &format!("0/x:0,0:1{{{}}}", checksum)),
            Err(SerializeError::Malformed(_))
        ));
        assert!(matches!(
            serializer.deserialize(&doc, &format!("0/9/0:0,0/2/0:3{{{}}}", checksum)),
            Err(SerializeError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_find_text_spans_nodes() {
        let doc = parse_xhtml("<body><p>hello <em>wide</em> world</p></body>").unwrap();
        let range = ChecksumRangeSerializer::new()
            .find_text(&doc, "Hello Wide", FindOptions::default())
            .unwrap();
        assert_eq!(range.text(&doc), "hello wide");
    }
}
