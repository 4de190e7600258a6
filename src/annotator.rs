//! Annotation creation and editing
//!
//! Encodes what the user selected on the live page, gives it a default
//! title and saves it. Open sessions pick the change up through the store
//! subscription.

use std::sync::Arc;

use tracing::{debug, info};

use crate::anchor::PositionCodec;
use crate::annotations::{Annotation, AnnotationEdit, AnnotationStore, StoreError};
use crate::dom::{LiveRange, NodeId, SharedDocument};
use crate::error::Result;

pub struct Annotator {
    codec: PositionCodec,
    store: Arc<dyn AnnotationStore>,
}

impl Annotator {
    pub fn new(codec: PositionCodec, store: Arc<dyn AnnotationStore>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &PositionCodec {
        &self.codec
    }

    /// Annotate the current text selection
    pub async fn annotate_selection(
        &self,
        page_url: &str,
        doc: &SharedDocument,
        selection: Option<LiveRange>,
    ) -> Result<Annotation> {
        let anchor = {
            let doc = doc.lock();
            self.codec.encode_selection(&doc, selection.as_ref())?
        };
        self.save(Annotation::new_text(page_url, anchor)).await
    }

    /// Annotate the image at (or containing) `element`
    pub async fn annotate_image(
        &self,
        page_url: &str,
        doc: &SharedDocument,
        element: NodeId,
    ) -> Result<Annotation> {
        let (descriptor, content) = {
            let doc = doc.lock();
            self.codec.encode_image(&doc, element)?
        };
        self.save(Annotation::new_image(page_url, descriptor, content)).await
    }

    async fn save(&self, annotation: Annotation) -> Result<Annotation> {
        let mut saved = None;
        self.store
            .update(Box::new(|annotations: &mut Vec<Annotation>| {
                // Titles count the collection as written, not as last read
                let annotation = annotation.with_title(&format!("annotation-{}", annotations.len() + 1));
                annotations.push(annotation.clone());
                saved = Some(annotation);
                true
            }))
            .await?;

        let annotation = saved.ok_or_else(|| StoreError::Unavailable("annotation was not written".into()))?;
        info!("Saved annotation {} on {}", annotation.id, annotation.source_url);
        Ok(annotation)
    }

    /// Apply a display-field edit. Returns the updated annotation, or
    /// `None` when `id` is unknown.
    pub async fn edit(&self, id: &str, edit: AnnotationEdit) -> Result<Option<Annotation>> {
        let mut updated = None;
        self.store
            .update(Box::new(|annotations: &mut Vec<Annotation>| {
                let Some(annotation) = annotations.iter_mut().find(|a| a.id == id) else {
                    return false;
                };
                annotation.edit(edit);
                updated = Some(annotation.clone());
                true
            }))
            .await?;

        if updated.is_some() {
            debug!("Edited annotation {}", id);
        }
        Ok(updated)
    }

    /// Delete one annotation; true if it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.remove(id).await?;
        if removed {
            info!("Deleted annotation {}", id);
        }
        Ok(removed)
    }

    /// Delete every annotation
    pub async fn clear(&self) -> Result<usize> {
        let mut count = 0;
        self.store
            .update(Box::new(|annotations: &mut Vec<Annotation>| {
                count = annotations.len();
                annotations.clear();
                count > 0
            }))
            .await?;
        info!("Cleared {} annotations", count);
        Ok(count)
    }
}
