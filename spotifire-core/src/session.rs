//! The root that owns the gate, the dispatch queue, the teardown
//! broadcast and one registry per object kind.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::dispatch::{DispatchQueue, DispatchStats, EventWorkItem};
use crate::error::{CoreError, Result};
use crate::gate::NativeGate;
use crate::kind::ObjectKind;
use crate::registry::{Registry, RegistryInner};
use crate::teardown::{SubscriptionId, Teardown, TeardownListener};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between the owning [`Session`] and the weak [`SessionRef`]s
/// held by objects and callbacks.
pub(crate) struct SessionShared {
    id: u64,
    config: SessionConfig,
    gate: Arc<NativeGate>,
    process_exiting: AtomicBool,
    pub(crate) teardown: Teardown,
    dispatch: DispatchQueue,
    registries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

/// Owner of everything session-scoped. Not `Clone`: dropping it tears the
/// session down (disposes every live object, then stops the dispatch thread).
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Start a session on the process-wide gate.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_gate(config, NativeGate::process())
    }

    /// Start a session on an explicit gate.
    pub fn with_gate(config: SessionConfig, gate: Arc<NativeGate>) -> Result<Self> {
        let dispatch = DispatchQueue::start(&config)?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, thread = %config.dispatch_thread_name, "session started");
        Ok(Self {
            shared: Arc::new(SessionShared {
                id,
                config,
                gate,
                process_exiting: AtomicBool::new(false),
                teardown: Teardown::default(),
                dispatch,
                registries: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn gate(&self) -> &Arc<NativeGate> {
        &self.shared.gate
    }

    /// Run `f` under this session's native call gate.
    pub fn with_native_call<R>(&self, f: impl FnOnce() -> R) -> R {
        self.shared.gate.with_native_call(f)
    }

    /// Weak reference for objects and callbacks.
    pub fn downgrade(&self) -> SessionRef {
        SessionRef(Arc::downgrade(&self.shared))
    }

    /// The registry for kind `K`, created with `make` on first use.
    pub fn registry<K: ObjectKind>(&self, make: impl FnOnce() -> K) -> Registry<K> {
        let mut registries = self.shared.registries.lock();
        let entry = registries.entry(TypeId::of::<K>()).or_insert_with(|| {
            tracing::debug!(session = self.shared.id, kind = K::NAME, "registry created");
            let inner: Arc<dyn Any + Send + Sync> = Arc::new(RegistryInner::new(
                make(),
                Arc::clone(&self.shared.gate),
                self.downgrade(),
            ));
            inner
        });
        let inner = Arc::clone(entry)
            .downcast::<RegistryInner<K>>()
            .unwrap_or_else(|_| unreachable!("registries are keyed by their kind's TypeId"));
        Registry::from_inner(inner)
    }

    /// Schedule `item` on the dispatch thread. Returns its sequence number.
    pub fn enqueue(&self, item: EventWorkItem) -> Result<u64> {
        self.shared.dispatch.enqueue(item)
    }

    /// Block until every event enqueued so far has been delivered.
    /// Refused on the dispatch thread itself and inside a gated call.
    pub fn flush(&self) -> Result<()> {
        if self.shared.gate.is_held_by_current_thread() {
            return Err(CoreError::FlushUnderGate);
        }
        self.shared.dispatch.flush()
    }

    pub fn is_dispatch_thread(&self) -> bool {
        self.shared.dispatch.is_dispatch_thread()
    }

    pub fn dispatch_stats(&self) -> &DispatchStats {
        self.shared.dispatch.stats()
    }

    /// Be notified by [`dispose_all`](Self::dispose_all).
    pub fn subscribe_teardown(&self, listener: Arc<dyn TeardownListener>) -> Result<SubscriptionId> {
        self.shared
            .teardown
            .subscribe(listener)
            .ok_or(CoreError::SessionClosed)
    }

    pub fn unsubscribe_teardown(&self, id: SubscriptionId) -> bool {
        self.shared.teardown.unsubscribe(id)
    }

    /// Number of objects and listeners still waiting for teardown.
    pub fn live_subscribers(&self) -> usize {
        self.shared.teardown.live_listeners()
    }

    /// Mark the native library as no longer trustworthy. From here on no
    /// native release is issued and disposed facades read as defaults.
    pub fn begin_process_exit(&self) {
        if !self.shared.process_exiting.swap(true, Ordering::AcqRel) {
            tracing::debug!(session = self.shared.id, "process exit teardown started");
        }
    }

    pub fn is_process_exiting(&self) -> bool {
        self.shared.is_process_exiting()
    }

    /// Dispose every live object of the session. Only the first call does
    /// anything; returns how many subscribers were notified.
    pub fn dispose_all(&self) -> usize {
        let notified = self.shared.teardown.broadcast();
        if notified > 0 {
            tracing::debug!(session = self.shared.id, notified, "session disposed all objects");
        }
        notified
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.teardown.has_fired()
    }

    /// Tear down and stop the dispatch thread. Same as dropping the session.
    pub fn close(self) {}

    fn shutdown(&self) {
        if self.shared.dispatch.is_closed() {
            return;
        }
        self.dispose_all();
        self.shared.dispatch.close(self.shared.config.drain_on_close);
        tracing::debug!(session = self.shared.id, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("torn_down", &self.is_torn_down())
            .field("process_exiting", &self.is_process_exiting())
            .finish_non_exhaustive()
    }
}

impl SessionShared {
    fn is_process_exiting(&self) -> bool {
        self.process_exiting.load(Ordering::Acquire)
    }
}

/// Non-owning back-reference to a session.
///
/// Held by shared objects, registries and callback targets. Once the
/// [`Session`] is dropped every operation reports the session as closed.
#[derive(Clone, Default)]
pub struct SessionRef(Weak<SessionShared>);

impl SessionRef {
    pub(crate) fn upgrade(&self) -> Option<Arc<SessionShared>> {
        self.0.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Schedule `item` on the session's dispatch thread.
    ///
    /// This is how native callback trampolines hand work to consumers.
    pub fn enqueue(&self, item: EventWorkItem) -> Result<u64> {
        let shared = self.upgrade().ok_or(CoreError::SessionClosed)?;
        shared.dispatch.enqueue(item)
    }

    pub fn is_process_exiting(&self) -> bool {
        self.upgrade()
            .is_some_and(|shared| shared.is_process_exiting())
    }

    /// True once `dispose_all` ran or the session was dropped.
    pub fn is_torn_down(&self) -> bool {
        self.upgrade()
            .map_or(true, |shared| shared.teardown.has_fired())
    }

    pub fn is_dispatch_thread(&self) -> bool {
        self.upgrade()
            .is_some_and(|shared| shared.dispatch.is_dispatch_thread())
    }

    pub fn gate(&self) -> Option<Arc<NativeGate>> {
        self.upgrade().map(|shared| Arc::clone(&shared.gate))
    }

    pub fn id(&self) -> Option<u64> {
        self.upgrade().map(|shared| shared.id)
    }
}

impl std::fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionRef").field(&self.id()).finish()
    }
}
