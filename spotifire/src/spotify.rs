//! The session wrapper consumers start from.

use std::fmt;
use std::sync::Arc;

use spotifire_core::{NativeGate, Registry, Session, SessionConfig, SessionRef};

use crate::api::{RawHandle, SpotifyApi};
use crate::artist::{Artist, ArtistKind};
use crate::error::Result;
use crate::link::{Link, LinkKind};
use crate::playlist_container::{PlaylistContainer, PlaylistContainerKind};
use crate::search::{Search, SearchKind};

/// Everything the object wrappers need to reach the library: the API, the
/// gate and one registry per object type.
pub(crate) struct Library {
    api: Arc<dyn SpotifyApi>,
    gate: Arc<NativeGate>,
    pub(crate) session: SessionRef,
    pub(crate) artists: Registry<ArtistKind>,
    pub(crate) searches: Registry<SearchKind>,
    pub(crate) containers: Registry<PlaylistContainerKind>,
    pub(crate) links: Registry<LinkKind>,
}

impl Library {
    /// Call the library outside the context of any one object.
    pub(crate) fn with_native_call<R>(&self, f: impl FnOnce(&dyn SpotifyApi) -> R) -> R {
        self.gate.with_native_call(|| f(self.api.as_ref()))
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("session", &self.session)
            .field("artists", &self.artists.len())
            .field("searches", &self.searches.len())
            .field("containers", &self.containers.len())
            .field("links", &self.links.len())
            .finish()
    }
}

/// A client session over one native library instance.
///
/// Dropping it disposes every artist, search, container and link still
/// alive and stops the dispatch thread.
pub struct Spotify {
    // Dropped before `lib`.
    session: Session,
    lib: Arc<Library>,
}

impl Spotify {
    /// Start a session on the process-wide native call gate.
    pub fn new(api: Arc<dyn SpotifyApi>, config: SessionConfig) -> Result<Self> {
        Self::with_gate(api, config, NativeGate::process())
    }

    pub fn with_gate(api: Arc<dyn SpotifyApi>, config: SessionConfig, gate: Arc<NativeGate>) -> Result<Self> {
        let session = Session::with_gate(config, gate)?;
        let lib = Arc::new_cyclic(|lib| Library {
            gate: Arc::clone(session.gate()),
            session: session.downgrade(),
            artists: session.registry(|| ArtistKind::new(Arc::clone(&api))),
            searches: session.registry(|| SearchKind::new(Arc::clone(&api), lib.clone())),
            containers: session.registry(|| PlaylistContainerKind::new(Arc::clone(&api), lib.clone())),
            links: session.registry(|| LinkKind::new(Arc::clone(&api))),
            api,
        });
        tracing::info!(session = session.id(), "spotify session started");
        Ok(Self { session, lib })
    }

    /// Start a session from a JSON configuration string.
    pub fn from_json(api: Arc<dyn SpotifyApi>, config_json: &str) -> Result<Self> {
        Self::new(api, SessionConfig::from_json(config_json)?)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Wrap an artist handle obtained elsewhere. Takes a reference of its own.
    pub fn artist(&self, raw: RawHandle) -> Result<Artist> {
        Artist::get(&self.lib, raw)
    }

    /// Start a search for artists. Results arrive asynchronously; see
    /// [`Search::wait`] and [`Search::on_complete`].
    pub fn search(&self, query: &str, artist_offset: i32, artist_count: i32) -> Result<Search> {
        Search::create(&self.lib, query, artist_offset, artist_count)
    }

    /// The logged-in user's playlist container.
    pub fn playlist_container(&self) -> Result<PlaylistContainer> {
        let raw = self.lib.with_native_call(|api| api.session_playlistcontainer());
        PlaylistContainer::get(&self.lib, raw)
    }

    /// Parse a `spotify:` URI.
    pub fn parse_link(&self, link: &str) -> Result<Link> {
        Link::parse(&self.lib, link)
    }

    /// Block until every callback event raised so far has been handled.
    /// Fails on the dispatch thread and inside a gated call, where it would
    /// wait on itself.
    pub fn flush(&self) -> Result<()> {
        Ok(self.session.flush()?)
    }

    /// Stop talking to the library: no native release will be issued from
    /// here on and reads return defaults.
    pub fn begin_process_exit(&self) {
        self.session.begin_process_exit();
    }

    /// Dispose every live object of this session.
    pub fn dispose_all(&self) -> usize {
        self.session.dispose_all()
    }

    /// Same as dropping.
    pub fn close(self) {}
}

impl fmt::Debug for Spotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spotify")
            .field("session", &self.session)
            .field("library", &self.lib)
            .finish()
    }
}
