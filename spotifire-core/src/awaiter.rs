//! Race-free one-shot completion for asynchronous native operations.
//!
//! A caller either learns that the operation already finished, or registers a
//! continuation that is guaranteed to run exactly once when it does. The check
//! and the registration are one atomic step, so there is no window in which a
//! completion can slip between them.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{CoreError, Result};

/// Work to run when a completion fires. Receives the completed value.
pub type Continuation<T> = Box<dyn FnOnce(&T) + Send + 'static>;

/// Capability of objects that model an asynchronous native operation.
pub trait Awaitable {
    /// Value handed to continuations.
    type Output;

    fn is_complete(&self) -> Result<bool>;

    /// Register `continuation` unless the operation already completed.
    ///
    /// Returns `Ok(false)` without registering anything when it has, in which
    /// case the caller must carry on synchronously. With `add_before_others`
    /// the continuation runs ahead of those already registered.
    fn add_continuation(
        &self,
        continuation: Continuation<Self::Output>,
        add_before_others: bool,
    ) -> Result<bool>;
}

/// Wait until `awaitable` completes. Returns immediately if it already has.
pub async fn completed<A: Awaitable + ?Sized>(awaitable: &A) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    let continuation: Continuation<A::Output> = Box::new(move |_: &A::Output| {
        let _ = tx.send(());
    });
    if !awaitable.add_continuation(continuation, false)? {
        return Ok(());
    }
    rx.await.map_err(|_| CoreError::CompletionAbandoned)
}

/// Pending continuations plus the completion flag, under one lock.
pub struct Completion<T> {
    state: Mutex<Pending<T>>,
}

struct Pending<T> {
    complete: bool,
    abandoned: bool,
    continuations: VecDeque<Continuation<T>>,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(Pending {
                complete: false,
                abandoned: false,
                continuations: VecDeque::new(),
            }),
        }
    }
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// See [`Awaitable::add_continuation`].
    ///
    /// Once abandoned, the continuation is accepted and dropped without ever
    /// running, which wakes a [`completed`] waiter with `CompletionAbandoned`.
    pub fn add_continuation(&self, continuation: Continuation<T>, add_before_others: bool) -> bool {
        let mut state = self.state.lock();
        if state.complete {
            return false;
        }
        if state.abandoned {
            drop(state);
            drop(continuation);
            return true;
        }
        if add_before_others {
            state.continuations.push_front(continuation);
        } else {
            state.continuations.push_back(continuation);
        }
        true
    }

    /// Number of continuations waiting.
    pub fn pending(&self) -> usize {
        self.state.lock().continuations.len()
    }

    /// Perform the one completion transition and run every pending
    /// continuation with `value`, in list order.
    ///
    /// Returns false (and runs nothing) if the transition already happened.
    /// Continuations run after the lock is released, so they may register
    /// further continuations (which will be refused) without deadlocking.
    pub fn complete(&self, value: &T) -> bool {
        let continuations = {
            let mut state = self.state.lock();
            if state.complete || state.abandoned {
                return false;
            }
            state.complete = true;
            std::mem::take(&mut state.continuations)
        };
        for continuation in continuations {
            continuation(value);
        }
        true
    }

    /// Give up on the completion: it will never fire. Pending continuations
    /// are dropped unrun, outside the lock. Returns how many there were.
    pub fn abandon(&self) -> usize {
        let continuations = {
            let mut state = self.state.lock();
            if state.complete || state.abandoned {
                return 0;
            }
            state.abandoned = true;
            std::mem::take(&mut state.continuations)
        };
        continuations.len()
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.lock().abandoned
    }
}

impl<T> Awaitable for Completion<T> {
    type Output = T;

    fn is_complete(&self) -> Result<bool> {
        Ok(Completion::is_complete(self))
    }

    fn add_continuation(&self, continuation: Continuation<T>, add_before_others: bool) -> Result<bool> {
        Ok(Completion::add_continuation(self, continuation, add_before_others))
    }
}
