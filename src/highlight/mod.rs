//! Highlight decorations
//!
//! Text highlights are `span` wrappers carrying the highlight class and the
//! correlation attribute; the first fragment also carries the annotation id
//! as its DOM `id`. Image highlights wrap the `<img>` with an overlay.

mod painter;

pub use painter::{ApplyFailure, ApplyOutcome, Painter};
