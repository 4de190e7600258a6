//! Highlight painting
//!
//! Decorations wrap existing nodes in place: text nodes are split at the
//! range boundaries and the covered pieces moved into highlight spans, and
//! images are moved into a wrapper with an overlay. Visible text and
//! unrelated markup are left untouched, so removing a decoration restores
//! the original tree.

use tracing::debug;

use crate::anchor::ResolvedTarget;
use crate::config::PainterConfig;
use crate::dom::{Document, LiveRange, NodeId, ScrollBehavior, ScrollBlock};

/// Why a decoration could not be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyFailure {
    /// The target is no longer attached to the document
    Detached,
    /// The range covers fewer characters than the configured minimum
    TooShort { length: usize },
    /// The element target is not an `<img>`
    NotAnImage,
    /// The range covers only whitespace
    Empty,
}

/// Result of applying a decoration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Newly decorated with this many fragments
    Applied { fragments: usize },
    /// A decoration with this id already exists
    AlreadyApplied,
    Failed(ApplyFailure),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Applies and removes highlight decorations
#[derive(Debug, Clone, Default)]
pub struct Painter {
    config: PainterConfig,
}

impl Painter {
    pub fn new(config: PainterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PainterConfig {
        &self.config
    }

    /// The canonical decoration of `id`. Page elements that merely share
    /// the id are not decorations.
    fn canonical(&self, doc: &Document, id: &str) -> Option<NodeId> {
        doc.get_element_by_id(id)
            .filter(|&element| doc.attr(element, &self.config.correlation_attribute) == Some(id))
    }

    /// Whether the canonical decoration for `id` is in the document
    pub fn is_applied(&self, doc: &Document, id: &str) -> bool {
        self.canonical(doc, id).is_some()
    }

    /// Decorate a resolved target for annotation `id`
    pub fn apply(&self, doc: &mut Document, target: &ResolvedTarget, id: &str) -> ApplyOutcome {
        if self.is_applied(doc, id) {
            return ApplyOutcome::AlreadyApplied;
        }
        match target {
            ResolvedTarget::Text(range) => self.apply_text(doc, range, id),
            ResolvedTarget::Image(image) => self.apply_image(doc, *image, id),
        }
    }

    fn apply_text(&self, doc: &mut Document, range: &LiveRange, id: &str) -> ApplyOutcome {
        if !range.is_attached(doc) {
            return ApplyOutcome::Failed(ApplyFailure::Detached);
        }

        let segments = range.text_segments(doc);
        let length: usize = segments.iter().map(|s| s.end - s.start).sum();
        if length < self.config.min_highlight_chars {
            return ApplyOutcome::Failed(ApplyFailure::TooShort { length });
        }

        let mut fragments = 0;
        for segment in segments {
            let covered: String = doc
                .text(segment.node)
                .unwrap_or_default()
                .chars()
                .skip(segment.start)
                .take(segment.end - segment.start)
                .collect();
            // Wrapping layout whitespace (between list items, table cells) breaks markup
            if covered.trim().is_empty() {
                continue;
            }
            let Some(parent) = doc.parent(segment.node) else {
                continue;
            };

            let node_len = doc.text(segment.node).map(|t| t.chars().count()).unwrap_or(0);
            if segment.end < node_len {
                doc.split_text(segment.node, segment.end);
            }
            let piece = if segment.start > 0 {
                match doc.split_text(segment.node, segment.start) {
                    Some(tail) => tail,
                    None => continue,
                }
            } else {
                segment.node
            };

            let span = doc.create_element("span");
            doc.add_class(span, &self.config.highlight_class);
            doc.set_attr(span, &self.config.correlation_attribute, id);
            if fragments == 0 {
                doc.set_attr(span, "id", id);
            }
            doc.insert_before(parent, span, Some(piece));
            doc.append_child(span, piece);
            fragments += 1;
        }

        if fragments == 0 {
            return ApplyOutcome::Failed(ApplyFailure::Empty);
        }
        debug!("Painted {} fragment(s) for {}", fragments, id);
        ApplyOutcome::Applied { fragments }
    }

    fn apply_image(&self, doc: &mut Document, image: NodeId, id: &str) -> ApplyOutcome {
        if !doc.is_connected(image) {
            return ApplyOutcome::Failed(ApplyFailure::Detached);
        }
        if doc.tag(image) != Some("img") {
            return ApplyOutcome::Failed(ApplyFailure::NotAnImage);
        }
        let Some(parent) = doc.parent(image) else {
            return ApplyOutcome::Failed(ApplyFailure::Detached);
        };

        let wrapper = doc.create_element("div");
        doc.add_class(wrapper, &self.config.image_wrapper_class);
        doc.set_attr(wrapper, &self.config.correlation_attribute, id);
        doc.set_attr(wrapper, "id", id);

        let overlay = doc.create_element("div");
        doc.add_class(overlay, &self.config.image_overlay_class);
        doc.set_attr(overlay, &self.config.correlation_attribute, id);

        doc.insert_before(parent, wrapper, Some(image));
        doc.append_child(wrapper, image);
        doc.append_child(wrapper, overlay);

        ApplyOutcome::Applied { fragments: 1 }
    }

    /// Remove every decoration of annotation `id`, restoring the wrapped
    /// nodes. Returns the number of decoration elements removed.
    pub fn remove(&self, doc: &mut Document, id: &str) -> usize {
        let mut removed = 0;

        for element in doc.elements_with_attr(&self.config.correlation_attribute, id) {
            if doc.has_class(element, &self.config.image_overlay_class) {
                doc.remove(element);
            } else {
                unwrap(doc, element);
            }
            removed += 1;
        }

        if removed > 0 {
            debug!("Removed {} decoration element(s) for {}", removed, id);
        }
        removed
    }

    /// Scroll the canonical decoration of `id` into view and flash it.
    ///
    /// Returns false when no decoration exists yet.
    pub fn scroll_to(&self, doc: &mut Document, id: &str) -> bool {
        let Some(element) = self.canonical(doc, id) else {
            return false;
        };
        doc.scroll_into_view(element, ScrollBehavior::Smooth, ScrollBlock::Center);
        doc.add_class(element, &self.config.flash_class);
        true
    }

    /// End the flash started by [`scroll_to`](Self::scroll_to)
    pub fn clear_flash(&self, doc: &mut Document, id: &str) {
        if let Some(element) = self.canonical(doc, id) {
            doc.remove_class(element, &self.config.flash_class);
        }
    }

    /// Annotation ids correlated with `element` or anything inside it
    pub fn correlated_ids(&self, doc: &Document, element: NodeId) -> Vec<String> {
        let attribute = &self.config.correlation_attribute;
        let mut ids: Vec<String> = Vec::new();
        for node in std::iter::once(element).chain(doc.descendants(element)) {
            if let Some(id) = doc.attr(node, attribute) {
                if !ids.iter().any(|known| known == id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids
    }
}

/// Replace an element by its children and merge the text it split
fn unwrap(doc: &mut Document, element: NodeId) {
    let Some(parent) = doc.parent(element) else {
        return;
    };
    for child in doc.children(element).to_vec() {
        doc.insert_before(parent, child, Some(element));
    }
    doc.remove(element);
    doc.normalize(parent);
}
