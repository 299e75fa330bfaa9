//! Errors returned by the Spotify object model.

use spotifire_core::CoreError;

use crate::api::LinkType;

pub type Result<T, E = SpotifyError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SpotifyError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The library could not parse the link text.
    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("link points at {actual:?}, not {expected:?}")]
    WrongLinkType { expected: LinkType, actual: LinkType },

    #[error("index {index} out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },
}
