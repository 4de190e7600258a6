//! Resolution strategy chain
//!
//! A text anchor is resolved by trying strategies in a fixed order:
//!
//! 1. The range serializer's own serialization (when one is installed)
//! 2. The structural path
//! 3. A case-insensitive search for the selected text
//!
//! The first strategy to produce a range wins. Positional strategies must
//! also reproduce the selected text, so a path that now lands on unrelated
//! content counts as a miss. Images resolve through source and alt matching.

use std::sync::Arc;

use tracing::debug;

use super::image::resolve_image;
use super::search::{find_in_text_nodes, FindOptions};
use super::serializer::RangeSerializer;
use super::structural::resolve_range;
use super::types::TextAnchor;
use crate::annotations::{Annotation, AnnotationTarget};
use crate::config::DEFAULT_CORRELATION_ATTRIBUTE;
use crate::dom::{Document, LiveRange, NodeId};

/// A live location for an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTarget {
    Text(LiveRange),
    Image(NodeId),
}

/// A resolved target and the strategy that found it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub target: ResolvedTarget,
    pub strategy: &'static str,
}

/// One way of turning a text anchor into a live range
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, doc: &Document, anchor: &TextAnchor) -> Option<LiveRange>;
}

fn comparable(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether a positionally resolved range still covers the selected text
fn reproduces(doc: &Document, range: &LiveRange, exact: &str) -> bool {
    if range.is_collapsed() {
        return false;
    }
    let expected = comparable(exact);
    expected.is_empty() || comparable(&range.text(doc)) == expected
}

/// Deserialize the serializer's own output
pub struct LibraryStrategy {
    serializer: Arc<dyn RangeSerializer>,
}

impl LibraryStrategy {
    pub fn new(serializer: Arc<dyn RangeSerializer>) -> Self {
        Self { serializer }
    }
}

impl ResolveStrategy for LibraryStrategy {
    fn name(&self) -> &'static str {
        "library"
    }

    fn resolve(&self, doc: &Document, anchor: &TextAnchor) -> Option<LiveRange> {
        let library = anchor.library()?;
        match self.serializer.deserialize(doc, &library.serialized) {
            Ok(range) if reproduces(doc, &range, &anchor.exact) => Some(range),
            Ok(_) => {
                debug!("Serialized range no longer covers the selected text");
                None
            }
            Err(e) => {
                debug!("Serialized range did not resolve: {}", e);
                None
            }
        }
    }
}

/// Walk the structural path, looking through decorations
pub struct StructuralStrategy {
    decoration_attribute: String,
}

impl StructuralStrategy {
    pub fn new(decoration_attribute: &str) -> Self {
        Self {
            decoration_attribute: decoration_attribute.to_string(),
        }
    }
}

impl Default for StructuralStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_ATTRIBUTE)
    }
}

impl ResolveStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn resolve(&self, doc: &Document, anchor: &TextAnchor) -> Option<LiveRange> {
        let structural = anchor.structural()?;
        let range = resolve_range(doc, structural, &self.decoration_attribute)?;
        reproduces(doc, &range, &anchor.exact).then_some(range)
    }
}

/// Search for the selected text, through the serializer when available
pub struct TextSearchStrategy {
    serializer: Option<Arc<dyn RangeSerializer>>,
}

impl TextSearchStrategy {
    pub fn new(serializer: Option<Arc<dyn RangeSerializer>>) -> Self {
        Self { serializer }
    }
}

impl ResolveStrategy for TextSearchStrategy {
    fn name(&self) -> &'static str {
        "text-search"
    }

    fn resolve(&self, doc: &Document, anchor: &TextAnchor) -> Option<LiveRange> {
        if anchor.exact.trim().is_empty() {
            return None;
        }
        match &self.serializer {
            Some(serializer) => serializer.find_text(doc, &anchor.exact, FindOptions::default()),
            None => find_in_text_nodes(doc, &anchor.exact),
        }
    }
}

/// Ordered list of strategies
pub struct ResolutionChain {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl ResolutionChain {
    /// The standard chain: library (if a serializer is installed), structural, text search
    pub fn new(serializer: Option<Arc<dyn RangeSerializer>>) -> Self {
        Self::configured(serializer, DEFAULT_CORRELATION_ATTRIBUTE)
    }

    /// The standard chain for a painter whose decorations carry `decoration_attribute`
    pub fn configured(serializer: Option<Arc<dyn RangeSerializer>>, decoration_attribute: &str) -> Self {
        let mut strategies: Vec<Box<dyn ResolveStrategy>> = Vec::new();
        if let Some(serializer) = &serializer {
            strategies.push(Box::new(LibraryStrategy::new(serializer.clone())));
        }
        strategies.push(Box::new(StructuralStrategy::new(decoration_attribute)));
        strategies.push(Box::new(TextSearchStrategy::new(serializer)));
        Self { strategies }
    }

    /// A chain with a custom strategy order
    pub fn with_strategies(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve a text anchor; `None` when every strategy misses
    pub fn resolve_text(&self, doc: &Document, anchor: &TextAnchor) -> Option<Resolution> {
        for strategy in &self.strategies {
            if let Some(range) = strategy.resolve(doc, anchor) {
                return Some(Resolution {
                    target: ResolvedTarget::Text(range),
                    strategy: strategy.name(),
                });
            }
            debug!("Strategy {} missed for {:?}", strategy.name(), anchor.exact);
        }
        None
    }

    /// Resolve any annotation
    pub fn resolve(&self, doc: &Document, annotation: &Annotation) -> Option<Resolution> {
        match &annotation.target {
            AnnotationTarget::Text { anchor } => self.resolve_text(doc, anchor),
            AnnotationTarget::Image { descriptor, .. } => {
                let found = resolve_image(doc, descriptor);
                if found.is_none() {
                    debug!("No image matches {} (alt {:?})", descriptor.src, descriptor.alt);
                }
                found.map(|image| Resolution {
                    target: ResolvedTarget::Image(image),
                    strategy: "image",
                })
            }
        }
    }
}

impl Default for ResolutionChain {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::serializer::SerializeError;
    use crate::anchor::{ChecksumRangeSerializer, PositionCodec};
    use crate::dom::parse_xhtml;

    const MARKUP: &str = "<body><div><span>a</span><span>b</span><p>hello world</p></div></body>";

    /// Serializer whose serialization never resolves
    struct BrokenSerializer;

    impl RangeSerializer for BrokenSerializer {
        fn serialize(&self, _doc: &Document, _range: &LiveRange) -> Result<String, SerializeError> {
            Ok("opaque".into())
        }

        fn deserialize(&self, _doc: &Document, serialized: &str) -> Result<LiveRange, SerializeError> {
            Err(SerializeError::Malformed(serialized.into()))
        }

        fn find_text(&self, doc: &Document, text: &str, _options: FindOptions) -> Option<LiveRange> {
            find_in_text_nodes(doc, text)
        }
    }

    fn encode_hello(serializer: Arc<dyn RangeSerializer>) -> TextAnchor {
        let doc = parse_xhtml(MARKUP).unwrap();
        let p = doc.elements_by_tag("p")[0];
        let selection = LiveRange::within_text(doc.children(p)[0], 0, 11);
        PositionCodec::new()
            .with_serializer(serializer)
            .encode_selection(&doc, Some(&selection))
            .unwrap()
    }

    #[test]
    fn test_chain_order() {
        let with_library = ResolutionChain::new(Some(Arc::new(ChecksumRangeSerializer::new())));
        assert_eq!(with_library.strategy_names(), vec!["library", "structural", "text-search"]);
        assert_eq!(ResolutionChain::default().strategy_names(), vec!["structural", "text-search"]);
    }

    #[test]
    fn test_library_wins_on_identical_markup() {
        let serializer: Arc<dyn RangeSerializer> = Arc::new(ChecksumRangeSerializer::new());
        let anchor = encode_hello(serializer.clone());

        let reloaded = parse_xhtml(MARKUP).unwrap();
        let resolution = ResolutionChain::new(Some(serializer))
            .resolve_text(&reloaded, &anchor)
            .unwrap();
        assert_eq!(resolution.strategy, "library");
    }

    #[test]
    fn test_structural_fallback_when_library_fails() {
        let serializer: Arc<dyn RangeSerializer> = Arc::new(BrokenSerializer);
        let anchor = encode_hello(serializer.clone());
        assert!(anchor.library().is_some());

        let reloaded = parse_xhtml(MARKUP).unwrap();
        let resolution = ResolutionChain::new(Some(serializer))
            .resolve_text(&reloaded, &anchor)
            .unwrap();
        assert_eq!(resolution.strategy, "structural");
        let ResolvedTarget::Text(range) = resolution.target else {
            panic!("expected a text range");
        };
        assert_eq!(range.text(&reloaded), "hello world");
    }

    #[test]
    fn test_text_search_after_structural_drift() {
        let anchor = encode_hello(Arc::new(ChecksumRangeSerializer::new()));

        // Paragraph removed, same sentence elsewhere in different case
        let drifted = parse_xhtml("<body><div><span>a</span></div><h2>Hello World</h2></body>").unwrap();
        let resolution = ResolutionChain::new(Some(Arc::new(ChecksumRangeSerializer::new())))
            .resolve_text(&drifted, &anchor)
            .unwrap();
        assert_eq!(resolution.strategy, "text-search");
    }

    #[test]
    fn test_unrelated_content_at_same_path_is_a_miss() {
        let anchor = encode_hello(Arc::new(BrokenSerializer));

        let replaced =
            parse_xhtml("<body><div><span>a</span><span>b</span><p>goodbye moon</p></div></body>").unwrap();
        assert!(StructuralStrategy::default().resolve(&replaced, &anchor).is_none());
        assert!(ResolutionChain::default().resolve_text(&replaced, &anchor).is_none());
    }

    #[test]
    fn test_image_resolution() {
        let doc = parse_xhtml(r#"<body><img src="a.png" alt="Same"/><img src="b.png" alt="Same"/></body>"#).unwrap();
        let (descriptor, content) = PositionCodec::new()
            .encode_image(&doc, doc.elements_by_tag("img")[1])
            .unwrap();
        let annotation = Annotation::new_image("https://ex.com/a", descriptor, content);

        let resolution = ResolutionChain::default().resolve(&doc, &annotation).unwrap();
        assert_eq!(resolution.strategy, "image");
        assert_eq!(resolution.target, ResolvedTarget::Image(doc.elements_by_tag("img")[1]));
    }
}
