//! Annotation records
//!
//! An annotation owns exactly one anchor. Display fields (title, tags,
//! metadata, notes) are user-editable; the anchor never changes after
//! creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anchor::{ImageDescriptor, TextAnchor};
use crate::page_url::normalize_url;

/// A saved annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Unique identifier (UUID), also the canonical DOM id of its highlight
    pub id: String,
    /// Page the annotation belongs to, fragment stripped
    pub source_url: String,
    /// What was annotated and where
    pub target: AnnotationTarget,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub metadata: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Kinds of annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Text,
    Image,
}

/// The annotated fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnnotationTarget {
    Text {
        anchor: TextAnchor,
    },
    Image {
        descriptor: ImageDescriptor,
        content: ImageContent,
    },
}

/// Captured image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Source URL of the image
    pub src: String,
    /// PNG data URL, absent when the pixels could not be read (cross-origin)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

impl ImageContent {
    /// Best available reference: captured pixels, else the source URL
    pub fn reference(&self) -> &str {
        self.data_url.as_deref().unwrap_or(&self.src)
    }
}

/// A tag attached to an annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    /// Plain tag name
    Name(String),
    /// Tag with an assigned display color
    Colored { name: String, color: String },
}

impl TagRef {
    pub fn name(name: &str) -> Self {
        Self::Name(name.to_string())
    }

    pub fn colored(name: &str, color: &str) -> Self {
        Self::Colored {
            name: name.to_string(),
            color: color.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Colored { name, .. } => name,
        }
    }
}

/// User edit of display fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationEdit {
    pub title: Option<String>,
    pub tags: Option<Vec<TagRef>>,
    pub metadata: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl Annotation {
    /// Create a text annotation on `page_url`
    pub fn new_text(page_url: &str, anchor: TextAnchor) -> Self {
        Self::new(page_url, AnnotationTarget::Text { anchor })
    }

    /// Create an image annotation on `page_url`
    pub fn new_image(page_url: &str, descriptor: ImageDescriptor, content: ImageContent) -> Self {
        Self::new(page_url, AnnotationTarget::Image { descriptor, content })
    }

    fn new(page_url: &str, target: AnnotationTarget) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_url: normalize_url(page_url),
            target,
            title: String::new(),
            tags: Vec::new(),
            metadata: Vec::new(),
            notes: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_tags(mut self, tags: Vec<TagRef>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn kind(&self) -> AnnotationKind {
        match self.target {
            AnnotationTarget::Text { .. } => AnnotationKind::Text,
            AnnotationTarget::Image { .. } => AnnotationKind::Image,
        }
    }

    /// Selected text, or the image reference
    pub fn content(&self) -> &str {
        match &self.target {
            AnnotationTarget::Text { anchor } => &anchor.exact,
            AnnotationTarget::Image { content, .. } => content.reference(),
        }
    }

    /// Whether this annotation belongs to the page at `page_url`
    pub fn belongs_to(&self, page_url: &str) -> bool {
        normalize_url(&self.source_url) == normalize_url(page_url)
    }

    /// Apply a display-field edit
    pub fn edit(&mut self, edit: AnnotationEdit) {
        if let Some(title) = edit.title {
            self.title = title;
        }
        if let Some(tags) = edit.tags {
            self.tags = tags;
        }
        if let Some(metadata) = edit.metadata {
            self.metadata = metadata;
        }
        if let Some(notes) = edit.notes {
            self.notes = Some(notes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_text_annotation() {
        let annotation = Annotation::new_text("https://ex.com/a#frag", TextAnchor::from_text("hello"));

        assert_eq!(annotation.kind(), AnnotationKind::Text);
        assert_eq!(annotation.source_url, "https://ex.com/a");
        assert_eq!(annotation.content(), "hello");
        assert!(annotation.belongs_to("https://ex.com/a#other"));
        assert!(Uuid::parse_str(&annotation.id).is_ok());
    }

    #[test]
    fn test_image_content_degrades_to_src() {
        let descriptor = ImageDescriptor {
            src: "https://cdn.ex.com/cat.png".into(),
            alt: "cat".into(),
            natural_width: 10,
            natural_height: 10,
            alternate_src: None,
        };
        let content = ImageContent {
            src: descriptor.src.clone(),
            data_url: None,
        };
        let annotation = Annotation::new_image("https://ex.com/a", descriptor, content);
        assert_eq!(annotation.kind(), AnnotationKind::Image);
        assert_eq!(annotation.content(), "https://cdn.ex.com/cat.png");
    }

    #[test]
    fn test_edit_keeps_anchor() {
        let mut annotation = Annotation::new_text("https://ex.com/a", TextAnchor::from_text("hello"));
        let anchor_before = annotation.target.clone();

        annotation.edit(AnnotationEdit {
            title: Some("greeting".into()),
            tags: Some(vec![TagRef::name("misc"), TagRef::colored("work", "#ff0000")]),
            notes: Some("first".into()),
            ..Default::default()
        });

        assert_eq!(annotation.title, "greeting");
        assert_eq!(annotation.tags[1].label(), "work");
        assert_eq!(annotation.notes.as_deref(), Some("first"));
        assert_eq!(annotation.target, anchor_before);
    }

    #[test]
    fn test_tags_accept_both_shapes() {
        let tags: Vec<TagRef> =
            serde_json::from_str(r##"["plain", {"name": "styled", "color": "#00ff00"}]"##).unwrap();
        assert_eq!(tags[0], TagRef::name("plain"));
        assert_eq!(tags[1], TagRef::colored("styled", "#00ff00"));
    }

    #[test]
    fn test_serialization() {
        let annotation = Annotation::new_text("https://ex.com/a", TextAnchor::from_text("hello"))
            .with_title("annotation-1")
            .with_metadata(vec!["title:Example".into()]);

        let json = serde_json::to_string_pretty(&annotation).unwrap();
        assert!(json.contains("\"sourceUrl\""));
        assert!(json.contains("\"kind\": \"text\""));

        let parsed: Annotation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, annotation);
    }
}
