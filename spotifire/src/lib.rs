//! Spotify object model over a single-threaded native client library.
//!
//! Every object ([`Artist`], [`Search`], [`PlaylistContainer`], [`Link`]) is a
//! dispose-once facade over one shared native reference, so they can be
//! cloned out of searches, sent across threads and dropped in any order.
//! Callbacks from the library are delivered on the session's dispatch thread.

pub mod api;
pub mod artist;
pub mod error;
pub mod link;
pub mod playlist_container;
pub mod search;
pub mod spotify;

pub use api::{LinkType, PlaylistContainerCallbacks, RawHandle, SearchCompleteCb, SpError, SpotifyApi};
pub use artist::Artist;
pub use error::{Result, SpotifyError};
pub use link::Link;
pub use playlist_container::{PlaylistContainer, PlaylistContainerEvent};
pub use search::{Search, SearchArtists};
pub use spotify::Spotify;

pub use spotifire_core::{Awaitable, SessionConfig, SubscriptionId};
