//! Messages exchanged with the host

use serde::{Deserialize, Serialize};

use crate::annotations::Annotation;

/// Inbound message from another extension context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostMessage {
    /// An annotation was just created on this page
    NewAnnotation { annotation: Annotation },
    /// Bring an annotation into view
    #[serde(rename_all = "camelCase")]
    ScrollToAnnotation { annotation_id: String },
}

/// Acknowledgement of a [`HostMessage`]: `success` is false when the work
/// was deferred rather than done immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn done() -> Self {
        Self { success: true }
    }

    pub fn deferred() -> Self {
        Self { success: false }
    }
}

/// Status updates for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Highlighted { annotation_id: String, strategy: String },
    #[serde(rename_all = "camelCase")]
    Dropped { annotation_id: String },
    /// Deleted from the store and unpainted
    #[serde(rename_all = "camelCase")]
    Removed { annotation_id: String },
    /// The store could not be read; what is already painted stays
    StorageFault { message: String },
    /// The queue ran empty
    Settled { highlighted: usize, dropped: usize },
}
