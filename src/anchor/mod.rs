//! Anchoring
//!
//! Converts between live document locations and persistable anchors.
//!
//! # Features
//!
//! - Structural `{tag, index}` paths that ignore script/style/iframe siblings
//! - Pluggable range serializer with a built-in checksummed implementation
//! - Resolution chain: serializer, structural path, then text search
//! - Image anchors matched by source, alternate source, then alt text

mod codec;
mod image;
mod resolver;
mod search;
mod serializer;
mod structural;
mod types;

pub use codec::{EncodeError, PositionCodec};
pub use image::{describe_image, locate_image, resolve_image, CaptureError, PixelCapture};
pub use resolver::{
    LibraryStrategy, Resolution, ResolutionChain, ResolveStrategy, ResolvedTarget,
    StructuralStrategy, TextSearchStrategy,
};
pub use search::{find_across_nodes, find_in_text_nodes, visible_text_nodes, FindOptions};
pub use serializer::{ChecksumRangeSerializer, RangeSerializer, SerializeError};
pub use structural::{encode_point, encode_range, resolve_point, resolve_range};
pub use types::{
    ImageDescriptor, LeafStep, NodePath, PathStep, PositionDescriptor, SerializedRange,
    StructuralRange, TextAnchor,
};
