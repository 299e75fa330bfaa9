//! The native call gate: one lock in front of the whole native library.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::PROCESS_GATE;

/// Mutual-exclusion region every native call must run inside.
///
/// Property reads, method calls, add-ref and release all go through
/// [`with_native_call`](Self::with_native_call). The gate is not re-entrant:
/// calling it again from inside a gated call deadlocks (and trips a debug
/// assertion first).
#[derive(Debug, Default)]
pub struct NativeGate {
    lock: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

impl NativeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate shared by the whole process.
    pub fn process() -> Arc<NativeGate> {
        Arc::clone(&PROCESS_GATE)
    }

    /// Run `f` while holding the gate and return its result.
    pub fn with_native_call<R>(&self, f: impl FnOnce() -> R) -> R {
        let current = thread::current().id();
        debug_assert!(
            !self.is_held_by(current),
            "re-entrant native call on {current:?} would deadlock"
        );
        let _lock = self.lock.lock();
        let _owner = OwnerGuard::enter(&self.owner, current);
        f()
    }

    /// Whether the calling thread is currently inside a gated call.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.is_held_by(thread::current().id())
    }

    fn is_held_by(&self, thread: ThreadId) -> bool {
        *self.owner.lock() == Some(thread)
    }
}

/// Records the holder for the duration of a gated call, cleared on unwind too.
struct OwnerGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> OwnerGuard<'a> {
    fn enter(owner: &'a Mutex<Option<ThreadId>>, thread: ThreadId) -> Self {
        *owner.lock() = Some(thread);
        Self(owner)
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}
