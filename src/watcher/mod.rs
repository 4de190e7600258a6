//! Live page watchers
//!
//! Signals that feed the scheduler while a page is open:
//!
//! - `MutationWatcher`: content added to the page re-triggers draining
//!   after a throttle
//! - `VisibilityWatcher`: content scrolling into view boosts the
//!   annotations correlated with it

mod mutations;
mod visibility;

pub use mutations::{qualifies, MutationWatcher};
pub use visibility::{IntersectionEntry, VisibilityWatcher};
