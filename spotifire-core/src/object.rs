//! The single owner of one native reference.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::error::{CoreError, Result};
use crate::gate::NativeGate;
use crate::handle::NativeHandle;
use crate::kind::ObjectKind;
use crate::registry::RegistryInner;
use crate::session::SessionRef;
use crate::teardown::{SubscriptionId, TeardownListener};

/// The one object per `(kind, handle)` that owns the native reference.
///
/// Created by the registry on first lookup, which takes the native reference;
/// disposed when the last facade goes away or when the session tears down,
/// which drops it. `refs` counts live facades and only changes under the
/// registry lock.
pub struct SharedObject<K: ObjectKind> {
    handle: NativeHandle,
    kind: Arc<K>,
    state: K::State,
    gate: Arc<NativeGate>,
    session: SessionRef,
    registry: Weak<RegistryInner<K>>,
    refs: AtomicUsize,
    disposed: AtomicBool,
    teardown_id: OnceCell<SubscriptionId>,
}

impl<K: ObjectKind> SharedObject<K> {
    /// Take the native reference, attach state and subscribe to teardown.
    /// Runs under the registry lock.
    pub(crate) fn create(
        registry: &Arc<RegistryInner<K>>,
        handle: NativeHandle,
        state: Option<K::State>,
    ) -> Result<Arc<Self>> {
        let session = registry.session.upgrade().ok_or(CoreError::SessionClosed)?;
        if session.teardown.has_fired() {
            return Err(CoreError::SessionClosed);
        }

        let kind = &registry.kind;
        let state = registry.gate.with_native_call(|| {
            kind.add_ref(handle);
            match state {
                Some(state) => state,
                None => kind.attach(handle, &registry.session),
            }
        });

        let object = Arc::new(Self {
            handle,
            kind: Arc::clone(kind),
            state,
            gate: Arc::clone(&registry.gate),
            session: registry.session.clone(),
            registry: Arc::downgrade(registry),
            refs: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            teardown_id: OnceCell::new(),
        });

        let listener: Arc<dyn TeardownListener> = object.clone();
        match session.teardown.subscribe(listener) {
            Some(id) => {
                let _ = object.teardown_id.set(id);
            }
            None => {
                // dispose_all won the race; hand the reference straight back.
                // Nothing can be waiting on an object nobody has seen yet.
                object.dispose(true);
                return Err(CoreError::SessionClosed);
            }
        }

        tracing::debug!(kind = K::NAME, %handle, "shared object created");
        Ok(object)
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn state(&self) -> &K::State {
        &self.state
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    /// Live facades currently counted against this object.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn gate(&self) -> &NativeGate {
        &self.gate
    }

    pub(crate) fn retain(&self) -> usize {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn unretain(&self) -> usize {
        let previous = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "{} refcount underflow", K::NAME);
        previous - 1
    }

    /// Drop the native reference. Only the first call does anything and
    /// returns true; the caller then owes one [`settle`](Self::settle) once it
    /// holds no locks.
    ///
    /// Skips the native calls entirely once the process is exiting. During a
    /// teardown broadcast native failures are logged and swallowed.
    pub(crate) fn dispose(&self, during_teardown: bool) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let (Some(id), Some(session)) = (self.teardown_id.get(), self.session.upgrade()) {
            session.teardown.unsubscribe(*id);
        }

        if self.session.is_process_exiting() {
            tracing::debug!(kind = K::NAME, handle = %self.handle, "process exiting, native release skipped");
            return true;
        }

        let release = || {
            self.gate.with_native_call(|| {
                self.kind.detach(self.handle, &self.state);
                self.kind.release(self.handle);
            })
        };
        if during_teardown {
            if catch_unwind(AssertUnwindSafe(release)).is_err() {
                tracing::debug!(kind = K::NAME, handle = %self.handle, "native release failed during teardown, ignored");
                return true;
            }
        } else {
            release();
        }
        tracing::debug!(kind = K::NAME, handle = %self.handle, "shared object released");
        true
    }

    /// Run the kind's post-dispose hook. Must not be called under the
    /// registry lock.
    pub(crate) fn settle(&self) {
        self.kind.disposed(&self.state);
    }
}

impl<K: ObjectKind> TeardownListener for SharedObject<K> {
    fn on_teardown(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.evict(self);
        }
        if self.dispose(true) {
            self.settle();
        }
    }
}

impl<K: ObjectKind> std::fmt::Debug for SharedObject<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedObject")
            .field("kind", &K::NAME)
            .field("handle", &self.handle)
            .field("refs", &self.ref_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
