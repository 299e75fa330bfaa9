//! The native client library surface.
//!
//! Mirrors the C API: opaque handles, explicit add-ref/release per object type,
//! and callbacks registered as function pointers plus a `void*` user data.
//! Implementations are not thread-safe; every call is made under the session's
//! native call gate.

use std::ffi::c_void;

use serde::Serialize;

/// Opaque native object pointer. Zero is never a valid object.
pub type RawHandle = usize;

/// Raised once when a search created with [`SpotifyApi::search_create`] has
/// finished loading, possibly on a library-internal thread.
pub type SearchCompleteCb = unsafe extern "C" fn(search: RawHandle, user_data: *mut c_void);

pub type PlaylistAddedCb =
    unsafe extern "C" fn(pc: RawHandle, playlist: RawHandle, position: i32, user_data: *mut c_void);

pub type PlaylistRemovedCb =
    unsafe extern "C" fn(pc: RawHandle, playlist: RawHandle, position: i32, user_data: *mut c_void);

pub type PlaylistMovedCb = unsafe extern "C" fn(
    pc: RawHandle,
    playlist: RawHandle,
    position: i32,
    new_position: i32,
    user_data: *mut c_void,
);

pub type ContainerLoadedCb = unsafe extern "C" fn(pc: RawHandle, user_data: *mut c_void);

/// Callback table passed to `playlistcontainer_add_callbacks`. Unset entries
/// are not called.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct PlaylistContainerCallbacks {
    pub playlist_added: Option<PlaylistAddedCb>,
    pub playlist_removed: Option<PlaylistRemovedCb>,
    pub playlist_moved: Option<PlaylistMovedCb>,
    pub container_loaded: Option<ContainerLoadedCb>,
}

/// Error codes reported by the library.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpError {
    #[default]
    Ok = 0,
    IsLoading = 17,
    OtherPermanent = 10,
    OtherTransient = 21,
    NetworkDisabled = 22,
}

/// What a link points at.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    Invalid = 0,
    Track = 1,
    Album = 2,
    Artist = 3,
    Search = 4,
    Playlist = 5,
    Profile = 6,
    Starred = 7,
    LocalTrack = 8,
    Image = 9,
}

/// Native library entry points used by this crate.
///
/// Handles returned by the `*_create*` functions carry one reference owned by
/// the caller. Handles returned by accessors (`search_artist`,
/// `link_as_artist`, `session_playlistcontainer`) are borrowed.
pub trait SpotifyApi: Send + Sync + 'static {
    // ─── Artist ──────────────────────────────────────────────────────

    fn artist_add_ref(&self, artist: RawHandle);
    fn artist_release(&self, artist: RawHandle);
    fn artist_is_loaded(&self, artist: RawHandle) -> bool;
    /// Empty until loaded.
    fn artist_name(&self, artist: RawHandle) -> String;

    // ─── Search ──────────────────────────────────────────────────────

    fn search_create(
        &self,
        query: &str,
        artist_offset: i32,
        artist_count: i32,
        callback: SearchCompleteCb,
        user_data: *mut c_void,
    ) -> RawHandle;
    fn search_add_ref(&self, search: RawHandle);
    fn search_release(&self, search: RawHandle);
    fn search_is_loaded(&self, search: RawHandle) -> bool;
    fn search_error(&self, search: RawHandle) -> SpError;
    fn search_query(&self, search: RawHandle) -> String;
    fn search_did_you_mean(&self, search: RawHandle) -> String;
    fn search_num_artists(&self, search: RawHandle) -> i32;
    fn search_artist(&self, search: RawHandle, index: i32) -> RawHandle;
    fn search_total_artists(&self, search: RawHandle) -> i32;

    // ─── Playlist container ──────────────────────────────────────────

    fn session_playlistcontainer(&self) -> RawHandle;
    fn playlistcontainer_add_ref(&self, pc: RawHandle);
    fn playlistcontainer_release(&self, pc: RawHandle);
    fn playlistcontainer_add_callbacks(
        &self,
        pc: RawHandle,
        callbacks: *const PlaylistContainerCallbacks,
        user_data: *mut c_void,
    );
    fn playlistcontainer_remove_callbacks(
        &self,
        pc: RawHandle,
        callbacks: *const PlaylistContainerCallbacks,
        user_data: *mut c_void,
    );
    fn playlistcontainer_is_loaded(&self, pc: RawHandle) -> bool;
    fn playlistcontainer_num_playlists(&self, pc: RawHandle) -> i32;
    fn playlistcontainer_playlist_name(&self, pc: RawHandle, index: i32) -> String;

    // ─── Link ────────────────────────────────────────────────────────

    /// Zero if `link` doesn't parse.
    fn link_create_from_string(&self, link: &str) -> RawHandle;
    fn link_create_from_artist(&self, artist: RawHandle) -> RawHandle;
    fn link_add_ref(&self, link: RawHandle);
    fn link_release(&self, link: RawHandle);
    fn link_type(&self, link: RawHandle) -> LinkType;
    fn link_as_artist(&self, link: RawHandle) -> RawHandle;
    fn link_as_string(&self, link: RawHandle) -> String;
}
