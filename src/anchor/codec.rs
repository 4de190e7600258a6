//! Position codec: turns a live selection or image into a stored anchor

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::image::{describe_image, locate_image, PixelCapture};
use super::serializer::{RangeSerializer, SerializeError};
use super::structural::encode_range;
use super::types::{ImageDescriptor, PositionDescriptor, SerializedRange, TextAnchor};
use crate::annotations::ImageContent;
use crate::config::DEFAULT_CORRELATION_ATTRIBUTE;
use crate::dom::{Document, LiveRange, NodeId};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("No text is selected")]
    EmptySelection,

    #[error("Selection could not be encoded: {0}")]
    Unencodable(String),

    #[error("No image found at the target element")]
    ImageNotFound,

    #[error("Serializer error: {0}")]
    Serializer(#[from] SerializeError),
}

/// Encodes selections and images, using an installed serializer when present
#[derive(Clone)]
pub struct PositionCodec {
    serializer: Option<Arc<dyn RangeSerializer>>,
    capture: Option<Arc<dyn PixelCapture>>,
    decoration_attribute: String,
}

impl Default for PositionCodec {
    fn default() -> Self {
        Self {
            serializer: None,
            capture: None,
            decoration_attribute: DEFAULT_CORRELATION_ATTRIBUTE.to_string(),
        }
    }
}

impl PositionCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute carried by the painter's decorations, which structural
    /// paths look through
    pub fn with_decoration_attribute(mut self, attribute: &str) -> Self {
        self.decoration_attribute = attribute.to_string();
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn RangeSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn PixelCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn serializer(&self) -> Option<Arc<dyn RangeSerializer>> {
        self.serializer.clone()
    }

    /// Encode the current selection.
    ///
    /// The serializer's output comes first when it succeeds; the structural
    /// path is always recorded as well so resolution has a fallback.
    pub fn encode_selection(
        &self,
        doc: &Document,
        selection: Option<&LiveRange>,
    ) -> Result<TextAnchor, EncodeError> {
        let range = selection
            .filter(|r| !r.is_collapsed())
            .ok_or(EncodeError::EmptySelection)?;
        let exact = range.text(doc);
        if exact.trim().is_empty() {
            return Err(EncodeError::EmptySelection);
        }

        let mut anchor = TextAnchor::from_text(&exact);

        if let Some(serializer) = &self.serializer {
            match serializer.serialize(doc, range) {
                Ok(serialized) => {
                    anchor = anchor.with_selector(PositionDescriptor::LibrarySerialized(
                        SerializedRange {
                            serialized,
                            selected_text: exact.clone(),
                        },
                    ));
                }
                Err(e) => debug!("Range serializer failed, using structural path only: {}", e),
            }
        }

        match encode_range(doc, range, &self.decoration_attribute) {
            Some(structural) => {
                anchor = anchor.with_selector(PositionDescriptor::Structural(structural));
            }
            None if anchor.selectors.is_empty() => {
                return Err(EncodeError::Unencodable(
                    "selection is outside the document body".into(),
                ));
            }
            None => {}
        }

        Ok(anchor)
    }

    /// Encode the image at (or around) `target`.
    ///
    /// Pixels are captured when a capture backend is installed; an
    /// unreadable (cross-origin) image keeps only its source URL.
    pub fn encode_image(
        &self,
        doc: &Document,
        target: NodeId,
    ) -> Result<(ImageDescriptor, ImageContent), EncodeError> {
        let image = locate_image(doc, target).ok_or(EncodeError::ImageNotFound)?;
        let descriptor = describe_image(doc, image).ok_or(EncodeError::ImageNotFound)?;

        let data_url = match &self.capture {
            Some(capture) => match capture.capture_png(&descriptor) {
                Ok(data_url) => Some(data_url),
                Err(e) => {
                    debug!("Keeping source URL for {}: {}", descriptor.src, e);
                    None
                }
            },
            None => None,
        };

        let content = ImageContent {
            src: descriptor.src.clone(),
            data_url,
        };
        Ok((descriptor, content))
    }
}
