//! Dispose-once consumer handle over a shared object.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::handle::NativeHandle;
use crate::kind::ObjectKind;
use crate::object::SharedObject;
use crate::registry::Registry;
use crate::session::SessionRef;

/// What callers hold. One per [`Registry::get`]; not `Clone`.
///
/// Dropping or disposing it gives its count back to the registry exactly once.
/// Two facades over the same live handle compare and hash equal; a disposed
/// facade hashes to a fixed sentinel.
pub struct Facade<K: ObjectKind> {
    registry: Registry<K>,
    object: Arc<SharedObject<K>>,
    disposed: AtomicBool,
}

const DISPOSED_SENTINEL: usize = 0;

impl<K: ObjectKind> Facade<K> {
    pub(crate) fn new(registry: Registry<K>, object: Arc<SharedObject<K>>) -> Self {
        Self {
            registry,
            object,
            disposed: AtomicBool::new(false),
        }
    }

    /// The native handle, or `None` once disposed.
    pub fn handle(&self) -> Option<NativeHandle> {
        self.is_alive().then(|| self.object.handle())
    }

    pub fn kind(&self) -> &K {
        self.object.kind()
    }

    pub fn session(&self) -> &SessionRef {
        self.object.session()
    }

    /// Neither this facade nor its shared object has been disposed.
    pub fn is_alive(&self) -> bool {
        !self.disposed.load(Ordering::Acquire) && !self.object.is_disposed()
    }

    pub fn check_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(CoreError::UseAfterDispose { kind: K::NAME })
        }
    }

    /// Call into the library for this object under the native call gate.
    ///
    /// Once the process is exiting the library is not called at all and
    /// `R::default()` is returned instead.
    pub fn with_native<R: Default>(
        &self,
        f: impl FnOnce(&K, NativeHandle, &K::State) -> R,
    ) -> Result<R> {
        if self.object.session().is_process_exiting() {
            return Ok(R::default());
        }
        self.check_alive()?;
        let object = &self.object;
        object.gate().with_native_call(|| {
            // dispose flips the flag before it waits on the gate
            if object.is_disposed() {
                return Err(CoreError::UseAfterDispose { kind: K::NAME });
            }
            Ok(f(object.kind(), object.handle(), object.state()))
        })
    }

    /// The attached state, while alive.
    ///
    /// Once the process is exiting the state is handed out even after
    /// disposal; it lives as long as this facade and never touches the library.
    pub fn state(&self) -> Result<&K::State> {
        if !self.object.session().is_process_exiting() {
            self.check_alive()?;
        }
        Ok(self.object.state())
    }

    /// Read the attached state without calling the library.
    pub fn with_state<R: Default>(&self, f: impl FnOnce(&K::State) -> R) -> Result<R> {
        if self.object.session().is_process_exiting() && !self.is_alive() {
            return Ok(R::default());
        }
        self.check_alive()?;
        Ok(f(self.object.state()))
    }

    /// Give this facade's count back. Only the first call does anything.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.registry.release_object(&self.object) {
            tracing::error!(kind = K::NAME, handle = %self.object.handle(), "facade dispose failed: {err}");
        }
    }

    /// Keep the count but drop the facade. Balance it later with
    /// [`Registry::release`].
    pub fn into_handle(self) -> NativeHandle {
        self.disposed.store(true, Ordering::Release);
        self.object.handle()
    }

    fn identity(&self) -> usize {
        self.handle().map_or(DISPOSED_SENTINEL, NativeHandle::as_raw)
    }
}

impl<K: ObjectKind> Drop for Facade<K> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<K: ObjectKind> PartialEq for Facade<K> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<K: ObjectKind> Eq for Facade<K> {}

impl<K: ObjectKind> Hash for Facade<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<K: ObjectKind> std::fmt::Debug for Facade<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade")
            .field("kind", &K::NAME)
            .field("handle", &self.object.handle())
            .field("alive", &self.is_alive())
            .finish()
    }
}
