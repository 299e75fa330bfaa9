//! Asynchronous searches.
//!
//! A search is created with a completion callback that the library raises on
//! its own thread once results are in. The callback only schedules an event;
//! continuations and `on_complete` handlers run on the dispatch thread.

use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use spotifire_core::awaiter::completed;
use spotifire_core::{
    Awaitable, Completion, Continuation, CoreError, EventTarget, EventWorkItem, Facade, NativeHandle,
    ObjectKind, ObserverList, SessionRef, SubscriptionId, UserData,
};

use crate::api::{RawHandle, SpError, SpotifyApi};
use crate::artist::Artist;
use crate::error::{Result, SpotifyError};
use crate::spotify::Library;

/// Handler for [`Search::on_complete`].
pub type SearchHandler = dyn Fn(&Search) + Send + Sync;

pub(crate) struct SearchKind {
    api: Arc<dyn SpotifyApi>,
    lib: Weak<Library>,
}

impl SearchKind {
    pub(crate) fn new(api: Arc<dyn SpotifyApi>, lib: Weak<Library>) -> Self {
        Self { api, lib }
    }
}

impl ObjectKind for SearchKind {
    type State = Arc<SearchShared>;
    const NAME: &'static str = "search";

    fn add_ref(&self, handle: NativeHandle) {
        self.api.search_add_ref(handle.as_raw());
    }

    fn release(&self, handle: NativeHandle) {
        self.api.search_release(handle.as_raw());
    }

    // Searches are only registered by `Search::create`, which always supplies
    // its state through `get_with`.
    fn attach(&self, _handle: NativeHandle, session: &SessionRef) -> Arc<SearchShared> {
        let shared = Arc::new(SearchShared::new(session.clone(), self.lib.clone()));
        shared.mark_registered();
        shared
    }

    /// No completion can arrive for a released search; wake anyone waiting.
    fn disposed(&self, state: &Arc<SearchShared>) {
        let dropped = state.completion.abandon();
        if dropped > 0 {
            tracing::debug!(dropped, "search disposed before completion, continuations dropped");
        }
    }
}

pub(crate) enum SearchEvent {
    Completed(RawHandle),
}

/// Per-search state, alive from before the native create call until the
/// shared object is dropped.
pub(crate) struct SearchShared {
    session: SessionRef,
    lib: Weak<Library>,
    completion: Completion<Search>,
    handlers: ObserverList<SearchHandler>,
    readiness: Mutex<Readiness>,
    user_data: Mutex<Option<UserData<SearchShared>>>,
}

/// Completion callbacks can fire before the create call has returned and the
/// handle is registered. Such a callback is parked here until then.
#[derive(Default)]
struct Readiness {
    registered: bool,
    parked: Option<RawHandle>,
}

impl SearchShared {
    fn new(session: SessionRef, lib: Weak<Library>) -> Self {
        Self {
            session,
            lib,
            completion: Completion::new(),
            handlers: ObserverList::new(),
            readiness: Mutex::new(Readiness::default()),
            user_data: Mutex::new(None),
        }
    }

    /// Called from the native thread.
    fn native_complete(self: &Arc<Self>, raw: RawHandle) {
        let mut readiness = self.readiness.lock();
        if readiness.registered {
            drop(readiness);
            self.schedule(raw);
        } else {
            readiness.parked = Some(raw);
        }
    }

    fn mark_registered(self: &Arc<Self>) {
        let parked = {
            let mut readiness = self.readiness.lock();
            readiness.registered = true;
            readiness.parked.take()
        };
        if let Some(raw) = parked {
            self.schedule(raw);
        }
    }

    fn schedule(self: &Arc<Self>, raw: RawHandle) {
        let item = EventWorkItem::new(self, SearchEvent::Completed(raw));
        if let Err(err) = self.session.enqueue(item) {
            tracing::debug!(search = raw, "search completion not scheduled: {err}");
        }
    }
}

impl EventTarget for SearchShared {
    type Event = SearchEvent;

    fn deliver(&self, event: SearchEvent) -> anyhow::Result<()> {
        let SearchEvent::Completed(raw) = event;
        let Some(lib) = self.lib.upgrade() else {
            return Ok(());
        };
        let Some(facade) = lib.searches.lookup(raw) else {
            tracing::debug!(search = raw, "search completed after release, ignored");
            return Ok(());
        };
        let search = Search { facade, lib };

        if !self.completion.complete(&search) {
            return Ok(());
        }
        for handler in self.handlers.snapshot() {
            handler(&search);
        }
        Ok(())
    }
}

impl Drop for SearchShared {
    fn drop(&mut self) {
        // The library may still hold the pointer if it was never released.
        if self.session.is_process_exiting() {
            if let Some(user_data) = self.user_data.get_mut().take() {
                user_data.leak();
            }
        }
    }
}

unsafe extern "C" fn search_complete(search: RawHandle, user_data: *mut c_void) {
    // Safety: user_data comes from the UserData stored in the target's state,
    // which outlives the native search.
    if let Some(shared) = unsafe { UserData::<SearchShared>::target(user_data) } {
        shared.native_complete(search);
    }
}

pub struct Search {
    facade: Facade<SearchKind>,
    lib: Arc<Library>,
}

impl Search {
    pub(crate) fn create(
        lib: &Arc<Library>,
        query: &str,
        artist_offset: i32,
        artist_count: i32,
    ) -> Result<Self> {
        let shared = Arc::new(SearchShared::new(lib.session.clone(), Arc::downgrade(lib)));
        let user_data = UserData::new(&shared);
        let raw = lib.with_native_call(|api| {
            api.search_create(
                query,
                artist_offset,
                artist_count,
                search_complete,
                user_data.as_ptr(),
            )
        });
        *shared.user_data.lock() = Some(user_data);

        let facade = lib.searches.get_with(raw, Arc::clone(&shared));
        if raw != 0 {
            lib.with_native_call(|api| api.search_release(raw));
        }
        let facade = facade?;
        shared.mark_registered();
        tracing::debug!(search = raw, query, "search created");

        Ok(Self {
            facade,
            lib: Arc::clone(lib),
        })
    }

    fn shared(&self) -> Result<&Arc<SearchShared>> {
        Ok(self.facade.state()?)
    }

    pub fn query(&self) -> Result<String> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.search_query(h.as_raw()))?)
    }

    /// Spelling suggestion, empty if none.
    pub fn did_you_mean(&self) -> Result<String> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.search_did_you_mean(h.as_raw()))?)
    }

    pub fn error(&self) -> Result<SpError> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.search_error(h.as_raw()))?)
    }

    /// Total matches on the server, not just the ones returned.
    pub fn total_artists(&self) -> Result<usize> {
        let total = self
            .facade
            .with_native(|kind, h, _| kind.api.search_total_artists(h.as_raw()))?;
        Ok(usize::try_from(total).unwrap_or(0))
    }

    pub fn artists(&self) -> SearchArtists<'_> {
        SearchArtists { search: self }
    }

    /// Whether the library reports the search as loaded.
    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self
            .facade
            .with_native(|kind, h, _| kind.api.search_is_loaded(h.as_raw()))?)
    }

    /// Whether the completion has been delivered.
    pub fn is_complete(&self) -> Result<bool> {
        Ok(self
            .facade
            .with_state(|shared| shared.completion.is_complete())?)
    }

    /// Run `handler` on the dispatch thread when the search completes.
    pub fn on_complete(&self, handler: impl Fn(&Search) + Send + Sync + 'static) -> Result<SubscriptionId> {
        let handler: Arc<SearchHandler> = Arc::new(handler);
        self.shared()?
            .handlers
            .subscribe(handler)
            .ok_or(SpotifyError::Core(CoreError::SessionClosed))
    }

    pub fn remove_on_complete(&self, id: SubscriptionId) -> bool {
        self.shared()
            .map(|shared| shared.handlers.unsubscribe(id))
            .unwrap_or(false)
    }

    /// Wait for the completion. Returns at once if it was already delivered,
    /// and fails with `CompletionAbandoned` if the search is disposed first.
    pub async fn wait(&self) -> Result<()> {
        completed(self).await?;
        Ok(())
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

impl Awaitable for Search {
    type Output = Search;

    fn is_complete(&self) -> spotifire_core::Result<bool> {
        self.facade
            .with_state(|shared| shared.completion.is_complete())
    }

    fn add_continuation(
        &self,
        continuation: Continuation<Search>,
        add_before_others: bool,
    ) -> spotifire_core::Result<bool> {
        let shared = self.facade.state()?;
        Ok(shared.completion.add_continuation(continuation, add_before_others))
    }
}

impl PartialEq for Search {
    fn eq(&self, other: &Self) -> bool {
        self.facade == other.facade
    }
}

impl Eq for Search {}

impl fmt::Debug for Search {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Search")
            .field("handle", &self.facade.handle())
            .field("query", &self.query().ok())
            .field("error", &self.error().ok())
            .field("total_artists", &self.total_artists().ok())
            .finish()
    }
}

/// The artists returned by a search, indexable like a slice.
pub struct SearchArtists<'a> {
    search: &'a Search,
}

impl SearchArtists<'_> {
    pub fn len(&self) -> Result<usize> {
        let count = self
            .search
            .facade
            .with_native(|kind, h, _| kind.api.search_num_artists(h.as_raw()))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<Artist> {
        let len = self.len()?;
        let position = i32::try_from(index)
            .ok()
            .filter(|_| index < len)
            .ok_or(SpotifyError::IndexOutOfRange { index, len })?;
        let raw = self
            .search
            .facade
            .with_native(|kind, h, _| kind.api.search_artist(h.as_raw(), position))?;
        Artist::get(&self.search.lib, raw)
    }

    /// Every artist in order. Stops at the first error.
    pub fn to_vec(&self) -> Result<Vec<Artist>> {
        (0..self.len()?).map(|index| self.get(index)).collect()
    }
}
