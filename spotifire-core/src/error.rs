//! Errors surfaced by the handle and dispatch layer.

use crate::handle::NativeHandle;

/// Result alias used across the crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Every failure the core can report.
///
/// `InvalidHandle` and `UseAfterDispose` are ordinary recoverable errors.
/// `DoubleRelease` means a reference count was broken by the caller and is
/// always logged at error level.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A zero handle was passed where a native object was expected.
    #[error("native handle can't be zero")]
    InvalidHandle,

    /// A facade (or its shared object) was used after it was disposed.
    #[error("{kind} used after dispose")]
    UseAfterDispose { kind: &'static str },

    /// `release` was called without a matching `get`.
    #[error("{kind} {handle} released without a matching get")]
    DoubleRelease {
        kind: &'static str,
        handle: NativeHandle,
    },

    /// A handler run by the dispatch thread returned an error or panicked.
    #[error("handler for {event} (seq {seq}) failed: {reason}")]
    DispatchHandlerFailure {
        seq: u64,
        event: &'static str,
        reason: String,
    },

    /// The session has been torn down or dropped.
    #[error("session is closed")]
    SessionClosed,

    /// `flush` was called from the dispatch thread, which would wait on itself.
    #[error("flush called from the dispatch thread")]
    ReentrantFlush,

    /// `flush` was called while the calling thread holds the native call gate.
    /// A queued handler that needs the gate would never finish.
    #[error("flush called while holding the native call gate")]
    FlushUnderGate,

    /// A pending completion was dropped before it fired.
    #[error("completion abandoned before it fired")]
    CompletionAbandoned,

    /// The dispatch thread could not be spawned.
    #[error("failed to start dispatch thread: {0}")]
    DispatchSpawn(#[source] std::io::Error),

    /// Session configuration could not be parsed.
    #[error("invalid session config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}
