//! Error types for the annotation core

use thiserror::Error;

use crate::anchor::EncodeError;
use crate::annotations::StoreError;
use crate::config::ConfigError;
use crate::dom::ParseError;
use crate::session::SessionError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Markup error: {0}")]
    Parse(#[from] ParseError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}
