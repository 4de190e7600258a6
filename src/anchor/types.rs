//! Position descriptor types
//!
//! Descriptors are plain data: they never hold node handles, so they survive
//! a round trip through the store and stay meaningful on a later page load.
//! The JSON shape matches what the extension has always persisted
//! (`{tag, index}` steps and `{type, index, offset}` leaves).

use serde::{Deserialize, Serialize};

/// One step from the body down to a container element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Lower-cased tag of the element at this step
    pub tag: String,
    /// Position among element siblings, not counting script/style/iframe
    pub index: usize,
}

/// Final step of a node path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LeafStep {
    /// Text: `index` counts runs of adjacent text nodes (highlight spans
    /// looked through), `offset` is in characters into the merged run
    Text { index: usize, offset: usize },
    /// The container element itself, with a child offset
    Element { offset: usize },
}

/// Path from the body to one range boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePath {
    pub steps: Vec<PathStep>,
    pub leaf: LeafStep,
}

/// Structural encoding of a text selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralRange {
    pub start_path: NodePath,
    pub end_path: NodePath,
}

/// Opaque serialization produced by a range serializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRange {
    pub serialized: String,
    pub selected_text: String,
}

/// Where in the document a text annotation lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PositionDescriptor {
    Structural(StructuralRange),
    LibrarySerialized(SerializedRange),
}

/// Anchor of a text annotation: the descriptors to try plus the literal text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnchor {
    /// Descriptors in the order they were produced
    pub selectors: Vec<PositionDescriptor>,
    /// The selected text, used by the text-search fallback
    pub exact: String,
}

impl TextAnchor {
    /// Anchor with no positional descriptor (text search only)
    pub fn from_text(exact: &str) -> Self {
        Self {
            selectors: Vec::new(),
            exact: exact.to_string(),
        }
    }

    pub fn with_selector(mut self, descriptor: PositionDescriptor) -> Self {
        self.selectors.push(descriptor);
        self
    }

    /// The library serialization, if one was captured
    pub fn library(&self) -> Option<&SerializedRange> {
        self.selectors.iter().find_map(|s| match s {
            PositionDescriptor::LibrarySerialized(range) => Some(range),
            PositionDescriptor::Structural(_) => None,
        })
    }

    /// The structural path, if one was captured
    pub fn structural(&self) -> Option<&StructuralRange> {
        self.selectors.iter().find_map(|s| match s {
            PositionDescriptor::Structural(range) => Some(range),
            PositionDescriptor::LibrarySerialized(_) => None,
        })
    }
}

/// Enough about an `<img>` to find it again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub natural_width: u32,
    #[serde(default)]
    pub natural_height: u32,
    /// Another source the same image was seen under (lazy-load or srcset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_src: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_json_shape() {
        let leaf = LeafStep::Text { index: 1, offset: 4 };
        let json = serde_json::to_value(&leaf).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "index": 1, "offset": 4}));

        let leaf: LeafStep = serde_json::from_str(r#"{"type":"element","offset":2}"#).unwrap();
        assert_eq!(leaf, LeafStep::Element { offset: 2 });
    }

    #[test]
    fn test_anchor_selector_lookup() {
        let structural = StructuralRange {
            start_path: NodePath {
                steps: vec![PathStep { tag: "p".into(), index: 0 }],
                leaf: LeafStep::Text { index: 0, offset: 0 },
            },
            end_path: NodePath {
                steps: vec![PathStep { tag: "p".into(), index: 0 }],
                leaf: LeafStep::Text { index: 0, offset: 5 },
            },
        };
        let anchor = TextAnchor::from_text("hello")
            .with_selector(PositionDescriptor::LibrarySerialized(SerializedRange {
                serialized: "0/0:0,0/0:5{abc}".into(),
                selected_text: "hello".into(),
            }))
            .with_selector(PositionDescriptor::Structural(structural.clone()));

        assert_eq!(anchor.structural(), Some(&structural));
        assert_eq!(anchor.library().map(|l| l.serialized.as_str()), Some("0/0:0,0/0:5{abc}"));

        let json = serde_json::to_string(&anchor).unwrap();
        assert!(json.contains(r#""kind":"librarySerialized""#));
        let parsed: TextAnchor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, anchor);
    }
}
