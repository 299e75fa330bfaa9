//! Per-kind map from native handle to its one shared object.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{CoreError, Result};
use crate::facade::Facade;
use crate::gate::NativeGate;
use crate::handle::NativeHandle;
use crate::kind::ObjectKind;
use crate::object::SharedObject;
use crate::session::SessionRef;

pub(crate) struct RegistryInner<K: ObjectKind> {
    pub(crate) kind: Arc<K>,
    pub(crate) gate: Arc<NativeGate>,
    pub(crate) session: SessionRef,
    pub(crate) objects: DashMap<NativeHandle, Arc<SharedObject<K>>>,
}

/// Canonicalizes native handles of kind `K` for one session.
///
/// Every `get` of the same handle returns a facade over the same
/// [`SharedObject`]; the native reference is taken on the first `get` and
/// dropped when the last facade is released. The map shard lock is the
/// registry lock: create, count changes and native release all happen while
/// holding it, so a handle is never half-registered.
pub struct Registry<K: ObjectKind> {
    inner: Arc<RegistryInner<K>>,
}

impl<K: ObjectKind> Clone for Registry<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ObjectKind> RegistryInner<K> {
    pub(crate) fn new(kind: K, gate: Arc<NativeGate>, session: SessionRef) -> Self {
        Self {
            kind: Arc::new(kind),
            gate,
            session,
            objects: DashMap::new(),
        }
    }

    fn acquire(
        self: &Arc<Self>,
        handle: NativeHandle,
        state: Option<K::State>,
    ) -> Result<Arc<SharedObject<K>>> {
        match self.objects.entry(handle) {
            Entry::Occupied(entry) => {
                let object = Arc::clone(entry.get());
                object.retain();
                Ok(object)
            }
            Entry::Vacant(entry) => {
                let object = SharedObject::create(self, handle, state)?;
                object.retain();
                entry.insert(Arc::clone(&object));
                Ok(object)
            }
        }
    }

    /// Drop one count from `object`. Released natively at zero.
    pub(crate) fn release_object(&self, object: &Arc<SharedObject<K>>) -> Result<()> {
        let handle = object.handle();
        match self.objects.entry(handle) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), object) => {
                if object.unretain() == 0 {
                    let disposed = object.dispose(false);
                    entry.remove();
                    if disposed {
                        object.settle();
                    }
                }
                Ok(())
            }
            _ => self.missing(handle),
        }
    }

    fn release_handle(&self, handle: NativeHandle) -> Result<()> {
        match self.objects.entry(handle) {
            Entry::Occupied(entry) if entry.get().ref_count() > 0 => {
                if entry.get().unretain() == 0 {
                    let disposed = entry.get().dispose(false);
                    let object = entry.remove();
                    if disposed {
                        object.settle();
                    }
                }
                Ok(())
            }
            _ => self.missing(handle),
        }
    }

    fn missing(&self, handle: NativeHandle) -> Result<()> {
        if self.session.is_torn_down() {
            // Teardown already evicted and released everything.
            return Ok(());
        }
        tracing::error!(kind = K::NAME, %handle, "release without a matching get");
        Err(CoreError::DoubleRelease {
            kind: K::NAME,
            handle,
        })
    }

    /// Forget `object` without touching its count. Used by teardown.
    pub(crate) fn evict(&self, object: &SharedObject<K>) {
        self.objects
            .remove_if(&object.handle(), |_, entry| std::ptr::eq(Arc::as_ptr(entry), object));
    }
}

impl<K: ObjectKind> Registry<K> {
    pub(crate) fn from_inner(inner: Arc<RegistryInner<K>>) -> Self {
        Self { inner }
    }

    /// Facade over the shared object for `raw`, creating it on first use.
    pub fn get(&self, raw: usize) -> Result<Facade<K>> {
        let handle = NativeHandle::new(raw)?;
        let object = self.inner.acquire(handle, None)?;
        Ok(Facade::new(self.clone(), object))
    }

    /// Like [`get`](Self::get), with the state to attach if the object is
    /// created by this call. `state` is dropped if the object already exists.
    pub fn get_with(&self, raw: usize, state: K::State) -> Result<Facade<K>> {
        let handle = NativeHandle::new(raw)?;
        let object = self.inner.acquire(handle, Some(state))?;
        Ok(Facade::new(self.clone(), object))
    }

    /// Facade for `raw` only if its shared object is currently live.
    pub fn lookup(&self, raw: usize) -> Option<Facade<K>> {
        let handle = NativeHandle::new(raw).ok()?;
        let entry = self.inner.objects.get(&handle)?;
        let object = Arc::clone(entry.value());
        object.retain();
        drop(entry);
        Some(Facade::new(self.clone(), object))
    }

    /// Drop one count from `raw` without going through a facade.
    ///
    /// For handles whose facade was turned into a raw count with
    /// [`Facade::into_handle`].
    pub fn release(&self, raw: usize) -> Result<()> {
        let handle = NativeHandle::new(raw)?;
        self.inner.release_handle(handle)
    }

    pub(crate) fn release_object(&self, object: &Arc<SharedObject<K>>) -> Result<()> {
        self.inner.release_object(object)
    }

    pub fn contains(&self, raw: usize) -> bool {
        NativeHandle::new(raw).is_ok_and(|handle| self.inner.objects.contains_key(&handle))
    }

    /// Live count for `raw`; 0 when not registered.
    pub fn ref_count(&self, raw: usize) -> usize {
        NativeHandle::new(raw)
            .ok()
            .and_then(|handle| self.inner.objects.get(&handle).map(|e| e.ref_count()))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.objects.is_empty()
    }

    pub fn kind(&self) -> &K {
        &self.inner.kind
    }

    pub fn session(&self) -> &SessionRef {
        &self.inner.session
    }
}

impl<K: ObjectKind> std::fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &K::NAME)
            .field("len", &self.len())
            .finish()
    }
}
