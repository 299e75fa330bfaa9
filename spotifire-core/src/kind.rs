//! Per-kind native reference operations.

use crate::handle::NativeHandle;
use crate::session::SessionRef;

/// One kind of native object (artist, search, playlist container, ...).
///
/// Supplies the native add-ref/release pair for the kind, plus the per-object
/// state that lives as long as the [`SharedObject`](crate::SharedObject).
/// `add_ref`, `attach`, `detach` and `release` all run under the native call
/// gate, so they must call the library directly and never take the gate
/// themselves. `attach` also runs under the registry lock and must not look up
/// objects of the same kind.
pub trait ObjectKind: Send + Sync + Sized + 'static {
    /// State attached to each shared object of this kind.
    type State: Send + Sync + 'static;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Take the native reference the shared object will own.
    fn add_ref(&self, handle: NativeHandle);

    /// Drop the reference taken by [`add_ref`](Self::add_ref).
    fn release(&self, handle: NativeHandle);

    /// Build the state for a newly created shared object.
    fn attach(&self, handle: NativeHandle, session: &SessionRef) -> Self::State;

    /// Undo whatever `attach` registered with the library, right before
    /// `release`. Skipped when the process is exiting.
    fn detach(&self, _handle: NativeHandle, _state: &Self::State) {}

    /// Runs once after the object is disposed, outside the gate and the
    /// registry lock, whether or not the native release was issued. Work still
    /// waiting on the object should be dropped here.
    fn disposed(&self, _state: &Self::State) {}
}
