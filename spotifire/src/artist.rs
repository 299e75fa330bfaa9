use std::sync::Arc;

use spotifire_core::{Facade, NativeHandle, ObjectKind, SessionRef};

use crate::api::{RawHandle, SpotifyApi};
use crate::error::Result;
use crate::link::Link;
use crate::spotify::Library;

pub(crate) struct ArtistKind {
    api: Arc<dyn SpotifyApi>,
}

impl ArtistKind {
    pub(crate) fn new(api: Arc<dyn SpotifyApi>) -> Self {
        Self { api }
    }
}

impl ObjectKind for ArtistKind {
    type State = ();
    const NAME: &'static str = "artist";

    fn add_ref(&self, handle: NativeHandle) {
        self.api.artist_add_ref(handle.as_raw());
    }

    fn release(&self, handle: NativeHandle) {
        self.api.artist_release(handle.as_raw());
    }

    fn attach(&self, _handle: NativeHandle, _session: &SessionRef) {}
}

/// An artist. Metadata is empty until the library has loaded it.
#[derive(Debug)]
pub struct Artist {
    facade: Facade<ArtistKind>,
    lib: Arc<Library>,
}

impl Artist {
    pub(crate) fn get(lib: &Arc<Library>, raw: RawHandle) -> Result<Self> {
        Ok(Self {
            facade: lib.artists.get(raw)?,
            lib: Arc::clone(lib),
        })
    }

    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.artist_is_loaded(h.as_raw()))?)
    }

    pub fn name(&self) -> Result<String> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.artist_name(h.as_raw()))?)
    }

    /// Loaded far enough to have a name.
    pub fn is_ready(&self) -> Result<bool> {
        Ok(!self.name()?.is_empty())
    }

    /// A link to this artist.
    pub fn link(&self) -> Result<Link> {
        let raw = self
            .facade
            .with_native(|kind, h, _| kind.api.link_create_from_artist(h.as_raw()))?;
        Link::adopt(&self.lib, raw)
    }

    pub fn handle(&self) -> Option<NativeHandle> {
        self.facade.handle()
    }

    pub fn is_alive(&self) -> bool {
        self.facade.is_alive()
    }

    pub fn dispose(&self) {
        self.facade.dispose();
    }
}

impl PartialEq for Artist {
    fn eq(&self, other: &Self) -> bool {
        self.facade == other.facade
    }
}

impl Eq for Artist {}

impl std::hash::Hash for Artist {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.facade, state);
    }
}
