//! Spotify URIs (`spotify:artist:...`) as native link objects.

use std::sync::Arc;

use spotifire_core::{Facade, NativeHandle, ObjectKind, SessionRef};

use crate::api::{LinkType, RawHandle, SpotifyApi};
use crate::artist::Artist;
use crate::error::{Result, SpotifyError};
use crate::spotify::Library;

pub(crate) struct LinkKind {
    api: Arc<dyn SpotifyApi>,
}

impl LinkKind {
    pub(crate) fn new(api: Arc<dyn SpotifyApi>) -> Self {
        Self { api }
    }
}

impl ObjectKind for LinkKind {
    type State = ();
    const NAME: &'static str = "link";

    fn add_ref(&self, handle: NativeHandle) {
        self.api.link_add_ref(handle.as_raw());
    }

    fn release(&self, handle: NativeHandle) {
        self.api.link_release(handle.as_raw());
    }

    fn attach(&self, _handle: NativeHandle, _session: &SessionRef) {}
}

#[derive(Debug)]
pub struct Link {
    facade: Facade<LinkKind>,
    lib: Arc<Library>,
}

impl Link {
    /// Wrap a link returned by a `link_create_*` call.
    ///
    /// The registry takes its own reference, then the one handed out by the
    /// create call is released.
    pub(crate) fn adopt(lib: &Arc<Library>, raw: RawHandle) -> Result<Self> {
        let facade = lib.links.get(raw);
        if raw != 0 {
            lib.with_native_call(|api| api.link_release(raw));
        }
        Ok(Self {
            facade: facade?,
            lib: Arc::clone(lib),
        })
    }

    pub(crate) fn parse(lib: &Arc<Library>, text: &str) -> Result<Self> {
        let raw = lib.with_native_call(|api| api.link_create_from_string(text));
        if raw == 0 {
            return Err(SpotifyError::InvalidLink(text.to_string()));
        }
        Self::adopt(lib, raw)
    }

    pub fn link_type(&self) -> Result<LinkType> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.link_type(h.as_raw()))?)
    }

    /// The artist this link points at.
    pub fn as_artist(&self) -> Result<Artist> {
        let (actual, raw) = self.facade.with_native(|kind, h, _| {
            let actual = kind.api.link_type(h.as_raw());
            let raw = if actual == LinkType::Artist {
                kind.api.link_as_artist(h.as_raw())
            } else {
                0
            };
            (actual, raw)
        })?;
        if actual != LinkType::Artist {
            return Err(SpotifyError::WrongLinkType {
                expected: LinkType::Artist,
                actual,
            });
        }
        Artist::get(&self.lib, raw)
    }

    /// The URI text, e.g. `spotify:artist:...`.
    pub fn as_string(&self) -> Result<String> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.link_as_string(h.as_raw()))?)
    }

    pub fn is_alive(&self) -> bool {
        self.facade.is_alive()
    }

    pub fn dispose(&self) {
        self.facade.dispose();
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.facade == other.facade
    }
}

impl Eq for Link {}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_string() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<disposed link>"),
        }
    }
}
