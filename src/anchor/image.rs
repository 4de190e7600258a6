//! Image anchors
//!
//! An image is described by its sources, alt text and natural size, and
//! found again by matching those against the `<img>` elements of the page.

use thiserror::Error;

use super::types::ImageDescriptor;
use crate::dom::{Document, NodeId};

/// Failure to read an image's pixels
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Cross-origin image cannot be read: {0}")]
    CrossOrigin(String),

    #[error("Capture failed: {0}")]
    Failed(String),
}

/// Reads an image's pixels into a PNG data URL
pub trait PixelCapture: Send + Sync {
    fn capture_png(&self, descriptor: &ImageDescriptor) -> Result<String, CaptureError>;
}

fn is_image(doc: &Document, node: NodeId) -> bool {
    doc.tag(node) == Some("img")
}

/// The image a user interaction refers to: the node itself, an enclosing
/// image, or the first image inside it.
pub fn locate_image(doc: &Document, node: NodeId) -> Option<NodeId> {
    if let Some(image) = doc.closest(node, is_image) {
        return Some(image);
    }
    doc.descendants(node).into_iter().find(|&n| is_image(doc, n))
}

/// Source the image was lazily loaded from or the first srcset candidate
fn alternate_source(doc: &Document, image: NodeId) -> Option<String> {
    if let Some(lazy) = doc.attr(image, "data-src").filter(|s| !s.is_empty()) {
        return Some(lazy.to_string());
    }
    doc.attr(image, "srcset")
        .and_then(|set| set.split(',').next())
        .and_then(|candidate| candidate.split_whitespace().next())
        .map(str::to_string)
}

fn dimension(doc: &Document, image: NodeId, natural: &str, declared: &str) -> u32 {
    doc.attr(image, natural)
        .or_else(|| doc.attr(image, declared))
        .and_then(|v| v.trim().trim_end_matches("px").parse().ok())
        .unwrap_or(0)
}

/// Describe an `<img>` element
pub fn describe_image(doc: &Document, image: NodeId) -> Option<ImageDescriptor> {
    if !is_image(doc, image) {
        return None;
    }
    let src = doc.attr(image, "src").unwrap_or_default().to_string();
    let alternate_src = alternate_source(doc, image).filter(|alt| *alt != src);
    Some(ImageDescriptor {
        src,
        alt: doc.attr(image, "alt").unwrap_or_default().to_string(),
        natural_width: dimension(doc, image, "data-natural-width", "width"),
        natural_height: dimension(doc, image, "data-natural-height", "height"),
        alternate_src,
    })
}

/// Find the image a descriptor refers to.
///
/// Tries, over all connected images in document order: an exact source
/// match, then a match through the alternate source, then the alt text.
pub fn resolve_image(doc: &Document, descriptor: &ImageDescriptor) -> Option<NodeId> {
    let images = doc.elements_by_tag("img");
    let src_of = |image: NodeId| doc.attr(image, "src").unwrap_or_default();

    if !descriptor.src.is_empty() {
        if let Some(&image) = images.iter().find(|&&i| src_of(i) == descriptor.src) {
            return Some(image);
        }
    }

    let by_alternate = images.iter().find(|&&image| {
        let stored_alternate = descriptor
            .alternate_src
            .as_deref()
            .map(|alt| alt == src_of(image))
            .unwrap_or(false);
        let live_alternate = !descriptor.src.is_empty()
            && alternate_source(doc, image).as_deref() == Some(descriptor.src.as_str());
        stored_alternate || live_alternate
    });
    if let Some(&image) = by_alternate {
        return Some(image);
    }

    if descriptor.alt.is_empty() {
        return None;
    }
    images
        .into_iter()
        .find(|&image| doc.attr(image, "alt") == Some(descriptor.alt.as_str()))
}
