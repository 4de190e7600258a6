//! Annotator Core
//!
//! Durable anchors for text and image annotations on web pages, and the
//! machinery that paints them again when the page is revisited.
//!
//! # Modules
//!
//! - `anchor`: position codec and the resolution strategy chain
//! - `annotations`: annotation records and stores
//! - `highlight`: the painter that decorates resolved ranges and images
//! - `scheduler`: prioritized, batched, bounded-retry processing
//! - `watcher`: mutation throttle and viewport visibility tracking
//! - `session`: one task per page tying the pieces together

pub mod anchor;
pub mod annotations;
pub mod annotator;
pub mod config;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod page_url;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod watcher;

pub use annotator::Annotator;
pub use config::AnchorConfig;
pub use error::{Error, Result};
pub use session::{PageSession, SessionEvent, SessionHandle};
