//! Lifetime and concurrency fence around a single-threaded native library.
//!
//! The native library hands out opaque handles, is not thread-safe, and raises
//! callbacks on its own internal thread. This crate makes it usable from any
//! number of threads:
//!
//! - every native call runs under one [`NativeGate`];
//! - each `(kind, handle)` pair maps to exactly one [`SharedObject`], owned by a
//!   per-session [`Registry`] and released natively exactly once;
//! - consumers hold dispose-once [`Facade`]s, one per lookup;
//! - callbacks become [`EventWorkItem`]s delivered in order on the session's
//!   dispatch thread, never on the native thread;
//! - asynchronous native operations expose a race-free [`Completion`].

pub mod awaiter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod gate;
pub mod handle;
pub mod kind;
pub mod object;
pub mod registry;
pub mod session;
pub mod teardown;
pub mod trampoline;

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use awaiter::{Awaitable, Completion, Continuation};
pub use config::SessionConfig;
pub use dispatch::{DispatchStats, EventTarget, EventWorkItem};
pub use error::{CoreError, Result};
pub use facade::Facade;
pub use gate::NativeGate;
pub use handle::NativeHandle;
pub use kind::ObjectKind;
pub use object::SharedObject;
pub use registry::Registry;
pub use session::{Session, SessionRef};
pub use teardown::{ObserverList, SubscriptionId, TeardownListener};
pub use trampoline::UserData;

/// Gate shared by every session that doesn't bring its own.
/// The wrapped library has one global state, so one lock covers all of it.
pub(crate) static PROCESS_GATE: Lazy<Arc<NativeGate>> = Lazy::new(|| Arc::new(NativeGate::new()));
