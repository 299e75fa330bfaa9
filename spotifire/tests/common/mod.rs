//! Recording fake of the native client library.
//!
//! Keeps a reference count per handle, flags overlapping calls (which the
//! native call gate must prevent) and raises callbacks from its own threads.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use spotifire::{
    LinkType, PlaylistContainerCallbacks, RawHandle, SearchCompleteCb, SessionConfig, SpError, Spotify,
    SpotifyApi,
};
use spotifire_core::NativeGate;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("spotifire=trace,spotifire_core=debug")
        .try_init();
}

/// A fresh fake library plus a session over it on its own gate.
pub fn spotify() -> (Arc<FakeSpotify>, Spotify) {
    init_tracing();
    let fake = Arc::new(FakeSpotify::default());
    let spotify = Spotify::with_gate(fake.clone(), SessionConfig::default(), Arc::new(NativeGate::new()))
        .expect("session starts");
    (fake, spotify)
}

struct FakeArtist {
    id: String,
    name: String,
    loaded: bool,
}

struct FakeSearch {
    query: String,
    loaded: bool,
    artists: Vec<RawHandle>,
    total_artists: i32,
    did_you_mean: String,
    error: SpError,
    callback: SearchCompleteCb,
    user_data: usize,
}

struct FakeLink {
    link_type: LinkType,
    target: RawHandle,
    text: String,
}

struct Registration {
    pc: RawHandle,
    callbacks: usize,
    user_data: usize,
}

#[derive(Default)]
struct FakeState {
    next_handle: usize,
    refs: HashMap<RawHandle, i64>,
    underflows: usize,
    artists: HashMap<RawHandle, FakeArtist>,
    searches: HashMap<RawHandle, FakeSearch>,
    links: HashMap<RawHandle, FakeLink>,
    container: RawHandle,
    container_loaded: bool,
    playlists: Vec<String>,
    registrations: Vec<Registration>,
}

impl FakeState {
    fn allocate(&mut self, initial_refs: i64) -> RawHandle {
        self.next_handle += 0x10;
        let handle = 0x1000 + self.next_handle;
        self.refs.insert(handle, initial_refs);
        handle
    }

    fn add_ref(&mut self, handle: RawHandle) {
        *self.refs.entry(handle).or_default() += 1;
    }

    fn release(&mut self, handle: RawHandle) {
        let count = self.refs.entry(handle).or_default();
        *count -= 1;
        match *count {
            0 => {
                // Freed: no more callbacks for it.
                self.searches.remove(&handle);
                self.links.remove(&handle);
            }
            n if n < 0 => self.underflows += 1,
            _ => {}
        }
    }
}

#[derive(Default)]
pub struct FakeSpotify {
    state: Mutex<FakeState>,
    inside: AtomicBool,
    overlaps: AtomicUsize,
    calls: AtomicUsize,
    /// Raise the completion callback from inside `search_create`, before the
    /// handle has been returned.
    pub complete_during_create: AtomicBool,
}

struct CallGuard<'a>(&'a FakeSpotify);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.inside.store(false, Ordering::SeqCst);
    }
}

impl FakeSpotify {
    fn enter(&self) -> CallGuard<'_> {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        CallGuard(self)
    }

    // ─── Test setup and inspection ───────────────────────────────────

    /// An artist owned by the library (one reference held internally).
    pub fn add_artist(&self, id: &str, name: &str) -> RawHandle {
        let mut state = self.state.lock();
        let handle = state.allocate(1);
        state.artists.insert(
            handle,
            FakeArtist {
                id: id.to_string(),
                name: name.to_string(),
                loaded: !name.is_empty(),
            },
        );
        handle
    }

    pub fn set_artist_name(&self, artist: RawHandle, name: &str) {
        if let Some(entry) = self.state.lock().artists.get_mut(&artist) {
            entry.name = name.to_string();
            entry.loaded = true;
        }
    }

    pub fn refs(&self, handle: RawHandle) -> i64 {
        self.state.lock().refs.get(&handle).copied().unwrap_or(0)
    }

    pub fn underflows(&self) -> usize {
        self.state.lock().underflows
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_playlists(&self, names: &[&str]) {
        let mut state = self.state.lock();
        state.playlists = names.iter().map(|name| name.to_string()).collect();
    }

    pub fn registered_callbacks(&self) -> usize {
        self.state.lock().registrations.len()
    }

    /// Finish `search` and raise its completion callback from a library thread.
    pub fn complete_search(&self, search: RawHandle, artists: &[RawHandle], total: i32) {
        let (callback, user_data) = {
            let mut state = self.state.lock();
            let Some(entry) = state.searches.get_mut(&search) else {
                return;
            };
            entry.loaded = true;
            entry.artists = artists.to_vec();
            entry.total_artists = total;
            (entry.callback, entry.user_data)
        };
        thread::spawn(move || unsafe { callback(search, user_data as *mut c_void) })
            .join()
            .expect("library thread");
    }

    pub fn set_did_you_mean(&self, search: RawHandle, suggestion: &str) {
        if let Some(entry) = self.state.lock().searches.get_mut(&search) {
            entry.did_you_mean = suggestion.to_string();
        }
    }

    /// Raise a container callback from a library thread, to every registration.
    pub fn fire_container(&self, fire: impl Fn(&PlaylistContainerCallbacks, RawHandle, *mut c_void) + Send + Sync + 'static) {
        let targets: Vec<(usize, RawHandle, usize)> = self
            .state
            .lock()
            .registrations
            .iter()
            .map(|r| (r.callbacks, r.pc, r.user_data))
            .collect();
        thread::spawn(move || {
            for (callbacks, pc, user_data) in targets {
                let callbacks = unsafe { &*(callbacks as *const PlaylistContainerCallbacks) };
                fire(callbacks, pc, user_data as *mut c_void);
            }
        })
        .join()
        .expect("library thread");
    }

    pub fn container(&self) -> RawHandle {
        let mut state = self.state.lock();
        if state.container == 0 {
            state.container = state.allocate(1);
        }
        state.container
    }
}

impl SpotifyApi for FakeSpotify {
    fn artist_add_ref(&self, artist: RawHandle) {
        let _call = self.enter();
        self.state.lock().add_ref(artist);
    }

    fn artist_release(&self, artist: RawHandle) {
        let _call = self.enter();
        self.state.lock().release(artist);
    }

    fn artist_is_loaded(&self, artist: RawHandle) -> bool {
        let _call = self.enter();
        self.state.lock().artists.get(&artist).is_some_and(|a| a.loaded)
    }

    fn artist_name(&self, artist: RawHandle) -> String {
        let _call = self.enter();
        self.state
            .lock()
            .artists
            .get(&artist)
            .map(|a| a.name.clone())
            .unwrap_or_default()
    }

    fn search_create(
        &self,
        query: &str,
        _artist_offset: i32,
        _artist_count: i32,
        callback: SearchCompleteCb,
        user_data: *mut c_void,
    ) -> RawHandle {
        let _call = self.enter();
        let handle = {
            let mut state = self.state.lock();
            let handle = state.allocate(1);
            state.searches.insert(
                handle,
                FakeSearch {
                    query: query.to_string(),
                    loaded: false,
                    artists: Vec::new(),
                    total_artists: 0,
                    did_you_mean: String::new(),
                    error: SpError::IsLoading,
                    callback,
                    user_data: user_data as usize,
                },
            );
            handle
        };
        if self.complete_during_create.load(Ordering::SeqCst) {
            if let Some(entry) = self.state.lock().searches.get_mut(&handle) {
                entry.loaded = true;
                entry.error = SpError::Ok;
            }
            unsafe { callback(handle, user_data) };
        }
        handle
    }

    fn search_add_ref(&self, search: RawHandle) {
        let _call = self.enter();
        self.state.lock().add_ref(search);
    }

    fn search_release(&self, search: RawHandle) {
        let _call = self.enter();
        self.state.lock().release(search);
    }

    fn search_is_loaded(&self, search: RawHandle) -> bool {
        let _call = self.enter();
        self.state.lock().searches.get(&search).is_some_and(|s| s.loaded)
    }

    fn search_error(&self, search: RawHandle) -> SpError {
        let _call = self.enter();
        let state = self.state.lock();
        match state.searches.get(&search) {
            Some(s) if s.loaded => SpError::Ok,
            Some(s) => s.error,
            None => SpError::OtherPermanent,
        }
    }

    fn search_query(&self, search: RawHandle) -> String {
        let _call = self.enter();
        self.state
            .lock()
            .searches
            .get(&search)
            .map(|s| s.query.clone())
            .unwrap_or_default()
    }

    fn search_did_you_mean(&self, search: RawHandle) -> String {
        let _call = self.enter();
        self.state
            .lock()
            .searches
            .get(&search)
            .map(|s| s.did_you_mean.clone())
            .unwrap_or_default()
    }

    fn search_num_artists(&self, search: RawHandle) -> i32 {
        let _call = self.enter();
        self.state
            .lock()
            .searches
            .get(&search)
            .map_or(0, |s| s.artists.len() as i32)
    }

    fn search_artist(&self, search: RawHandle, index: i32) -> RawHandle {
        let _call = self.enter();
        self.state
            .lock()
            .searches
            .get(&search)
            .and_then(|s| s.artists.get(index as usize).copied())
            .unwrap_or(0)
    }

    fn search_total_artists(&self, search: RawHandle) -> i32 {
        let _call = self.enter();
        self.state
            .lock()
            .searches
            .get(&search)
            .map_or(0, |s| s.total_artists)
    }

    fn session_playlistcontainer(&self) -> RawHandle {
        let _call = self.enter();
        let mut state = self.state.lock();
        if state.container == 0 {
            state.container = state.allocate(1);
        }
        state.container
    }

    fn playlistcontainer_add_ref(&self, pc: RawHandle) {
        let _call = self.enter();
        self.state.lock().add_ref(pc);
    }

    fn playlistcontainer_release(&self, pc: RawHandle) {
        let _call = self.enter();
        self.state.lock().release(pc);
    }

    fn playlistcontainer_add_callbacks(
        &self,
        pc: RawHandle,
        callbacks: *const PlaylistContainerCallbacks,
        user_data: *mut c_void,
    ) {
        let _call = self.enter();
        self.state.lock().registrations.push(Registration {
            pc,
            callbacks: callbacks as usize,
            user_data: user_data as usize,
        });
    }

    fn playlistcontainer_remove_callbacks(
        &self,
        pc: RawHandle,
        callbacks: *const PlaylistContainerCallbacks,
        user_data: *mut c_void,
    ) {
        let _call = self.enter();
        self.state.lock().registrations.retain(|r| {
            !(r.pc == pc && r.callbacks == callbacks as usize && r.user_data == user_data as usize)
        });
    }

    fn playlistcontainer_is_loaded(&self, _pc: RawHandle) -> bool {
        let _call = self.enter();
        self.state.lock().container_loaded
    }

    fn playlistcontainer_num_playlists(&self, _pc: RawHandle) -> i32 {
        let _call = self.enter();
        self.state.lock().playlists.len() as i32
    }

    fn playlistcontainer_playlist_name(&self, _pc: RawHandle, index: i32) -> String {
        let _call = self.enter();
        self.state
            .lock()
            .playlists
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn link_create_from_string(&self, link: &str) -> RawHandle {
        let _call = self.enter();
        let mut state = self.state.lock();
        let (link_type, target) = if let Some(id) = link.strip_prefix("spotify:artist:") {
            let target = state
                .artists
                .iter()
                .find(|(_, artist)| artist.id == id)
                .map(|(handle, _)| *handle);
            match target {
                Some(target) => (LinkType::Artist, target),
                None => return 0,
            }
        } else if link.starts_with("spotify:track:") {
            (LinkType::Track, 0)
        } else {
            return 0;
        };
        let handle = state.allocate(1);
        state.links.insert(
            handle,
            FakeLink {
                link_type,
                target,
                text: link.to_string(),
            },
        );
        handle
    }

    fn link_create_from_artist(&self, artist: RawHandle) -> RawHandle {
        let _call = self.enter();
        let mut state = self.state.lock();
        let Some(id) = state.artists.get(&artist).map(|a| a.id.clone()) else {
            return 0;
        };
        let handle = state.allocate(1);
        state.links.insert(
            handle,
            FakeLink {
                link_type: LinkType::Artist,
                target: artist,
                text: format!("spotify:artist:{id}"),
            },
        );
        handle
    }

    fn link_add_ref(&self, link: RawHandle) {
        let _call = self.enter();
        self.state.lock().add_ref(link);
    }

    fn link_release(&self, link: RawHandle) {
        let _call = self.enter();
        self.state.lock().release(link);
    }

    fn link_type(&self, link: RawHandle) -> LinkType {
        let _call = self.enter();
        self.state
            .lock()
            .links
            .get(&link)
            .map_or(LinkType::Invalid, |l| l.link_type)
    }

    fn link_as_artist(&self, link: RawHandle) -> RawHandle {
        let _call = self.enter();
        self.state
            .lock()
            .links
            .get(&link)
            .filter(|l| l.link_type == LinkType::Artist)
            .map_or(0, |l| l.target)
    }

    fn link_as_string(&self, link: RawHandle) -> String {
        let _call = self.enter();
        self.state
            .lock()
            .links
            .get(&link)
            .map(|l| l.text.clone())
            .unwrap_or_default()
    }
}
