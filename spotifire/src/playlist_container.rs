//! The user's playlist container and its change notifications.

use std::ffi::c_void;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use spotifire_core::{
    CoreError, EventTarget, EventWorkItem, Facade, NativeHandle, ObjectKind, ObserverList, SessionRef,
    SubscriptionId, UserData,
};

use crate::api::{PlaylistContainerCallbacks, RawHandle, SpotifyApi};
use crate::error::{Result, SpotifyError};
use crate::spotify::Library;

/// Change notifications raised by the library for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaylistContainerEvent {
    Loaded,
    PlaylistAdded {
        playlist: RawHandle,
        position: i32,
    },
    PlaylistRemoved {
        playlist: RawHandle,
        position: i32,
    },
    PlaylistMoved {
        playlist: RawHandle,
        position: i32,
        new_position: i32,
    },
}

/// Handler for [`PlaylistContainer::on_event`].
pub type PlaylistContainerHandler = dyn Fn(&PlaylistContainer, &PlaylistContainerEvent) + Send + Sync;

static CALLBACKS: PlaylistContainerCallbacks = PlaylistContainerCallbacks {
    playlist_added: Some(playlist_added),
    playlist_removed: Some(playlist_removed),
    playlist_moved: Some(playlist_moved),
    container_loaded: Some(container_loaded),
};

pub(crate) struct PlaylistContainerKind {
    api: Arc<dyn SpotifyApi>,
    lib: Weak<Library>,
}

impl PlaylistContainerKind {
    pub(crate) fn new(api: Arc<dyn SpotifyApi>, lib: Weak<Library>) -> Self {
        Self { api, lib }
    }
}

impl ObjectKind for PlaylistContainerKind {
    type State = Arc<ContainerShared>;
    const NAME: &'static str = "playlist_container";

    fn add_ref(&self, handle: NativeHandle) {
        self.api.playlistcontainer_add_ref(handle.as_raw());
    }

    fn release(&self, handle: NativeHandle) {
        self.api.playlistcontainer_release(handle.as_raw());
    }

    fn attach(&self, handle: NativeHandle, session: &SessionRef) -> Arc<ContainerShared> {
        let shared = Arc::new(ContainerShared {
            handle: handle.as_raw(),
            session: session.clone(),
            lib: self.lib.clone(),
            handlers: ObserverList::new(),
            user_data: Mutex::new(None),
        });
        let user_data = UserData::new(&shared);
        self.api
            .playlistcontainer_add_callbacks(handle.as_raw(), &CALLBACKS, user_data.as_ptr());
        *shared.user_data.lock() = Some(user_data);
        shared
    }

    fn detach(&self, handle: NativeHandle, state: &Arc<ContainerShared>) {
        if let Some(user_data) = state.user_data.lock().take() {
            self.api
                .playlistcontainer_remove_callbacks(handle.as_raw(), &CALLBACKS, user_data.as_ptr());
        }
    }
}

pub(crate) struct ContainerShared {
    handle: RawHandle,
    session: SessionRef,
    lib: Weak<Library>,
    handlers: ObserverList<PlaylistContainerHandler>,
    user_data: Mutex<Option<UserData<ContainerShared>>>,
}

impl ContainerShared {
    /// Called from the native thread.
    fn raise(self: &Arc<Self>, pc: RawHandle, event: PlaylistContainerEvent) {
        if pc != self.handle {
            return;
        }
        tracing::trace!(pc, ?event, "playlist container callback");
        if let Err(err) = self.session.enqueue(EventWorkItem::new(self, event)) {
            tracing::debug!(pc, "playlist container event not scheduled: {err}");
        }
    }
}

impl EventTarget for ContainerShared {
    type Event = PlaylistContainerEvent;

    fn deliver(&self, event: PlaylistContainerEvent) -> anyhow::Result<()> {
        let Some(lib) = self.lib.upgrade() else {
            return Ok(());
        };
        let Some(facade) = lib.containers.lookup(self.handle) else {
            tracing::debug!(pc = self.handle, ?event, "container event after release, ignored");
            return Ok(());
        };
        let container = PlaylistContainer { facade };
        for handler in self.handlers.snapshot() {
            handler(&container, &event);
        }
        Ok(())
    }
}

impl Drop for ContainerShared {
    fn drop(&mut self) {
        // detach is skipped on process exit, so the library still has the pointer.
        if let Some(user_data) = self.user_data.get_mut().take() {
            user_data.leak();
        }
    }
}

fn with_target(user_data: *mut c_void, f: impl FnOnce(Arc<ContainerShared>)) {
    // Safety: user_data is the pointer registered in `attach`; it stays valid
    // until the callbacks are removed in `detach`.
    if let Some(shared) = unsafe { UserData::<ContainerShared>::target(user_data) } {
        f(shared);
    }
}

unsafe extern "C" fn playlist_added(pc: RawHandle, playlist: RawHandle, position: i32, user_data: *mut c_void) {
    with_target(user_data, |shared| {
        shared.raise(pc, PlaylistContainerEvent::PlaylistAdded { playlist, position });
    });
}

unsafe extern "C" fn playlist_removed(pc: RawHandle, playlist: RawHandle, position: i32, user_data: *mut c_void) {
    with_target(user_data, |shared| {
        shared.raise(pc, PlaylistContainerEvent::PlaylistRemoved { playlist, position });
    });
}

unsafe extern "C" fn playlist_moved(
    pc: RawHandle,
    playlist: RawHandle,
    position: i32,
    new_position: i32,
    user_data: *mut c_void,
) {
    with_target(user_data, |shared| {
        shared.raise(
            pc,
            PlaylistContainerEvent::PlaylistMoved {
                playlist,
                position,
                new_position,
            },
        );
    });
}

unsafe extern "C" fn container_loaded(pc: RawHandle, user_data: *mut c_void) {
    with_target(user_data, |shared| shared.raise(pc, PlaylistContainerEvent::Loaded));
}

/// A playlist container. Its callbacks stay registered with the library for as
/// long as any facade for it is alive.
#[derive(Debug)]
pub struct PlaylistContainer {
    facade: Facade<PlaylistContainerKind>,
}

impl PlaylistContainer {
    pub(crate) fn get(lib: &Arc<Library>, raw: RawHandle) -> Result<Self> {
        Ok(Self {
            facade: lib.containers.get(raw)?,
        })
    }

    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.playlistcontainer_is_loaded(h.as_raw()))?)
    }

    pub fn num_playlists(&self) -> Result<usize> {
        let count = self
            .facade
            .with_native(|kind, h, _| kind.api.playlistcontainer_num_playlists(h.as_raw()))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn playlist_name(&self, index: usize) -> Result<String> {
        let len = self.num_playlists()?;
        let position = i32::try_from(index)
            .ok()
            .filter(|_| index < len)
            .ok_or(SpotifyError::IndexOutOfRange { index, len })?;
        Ok(self.facade.with_native(|kind, h, _| {
            kind.api.playlistcontainer_playlist_name(h.as_raw(), position)
        })?)
    }

    /// Run `handler` on the dispatch thread for every container event.
    pub fn on_event(
        &self,
        handler: impl Fn(&PlaylistContainer, &PlaylistContainerEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        let handler: Arc<PlaylistContainerHandler> = Arc::new(handler);
        self.facade
            .state()?
            .handlers
            .subscribe(handler)
            .ok_or(SpotifyError::Core(CoreError::SessionClosed))
    }

    pub fn remove_handler(&self, id: SubscriptionId) -> bool {
        self.facade
            .state()
            .map(|shared| shared.handlers.unsubscribe(id))
            .unwrap_or(false)
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

impl PartialEq for PlaylistContainer {
    fn eq(&self, other: &Self) -> bool {
        self.facade == other.facade
    }
}

impl Eq for PlaylistContainer {}
