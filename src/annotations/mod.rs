//! Annotation module
//!
//! Annotation records and the store they live in.
//!
//! # Features
//!
//! - Text and image annotations, each owning a single immutable anchor
//! - User-editable display fields (title, tags, metadata, notes)
//! - Store interface with change notifications:
//!   - `MemoryStore` for a single browsing context
//!   - `SqliteStore` for persistence across sessions

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteStore;
pub use store::{AnnotationStore, MemoryStore, StoreChange, StoreEdit, StoreError};
pub use types::{
    Annotation, AnnotationEdit, AnnotationKind, AnnotationTarget, ImageContent, TagRef,
};
