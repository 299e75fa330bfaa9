//! User-data pointers for C callbacks.
//!
//! The native library calls back through plain function pointers plus an
//! opaque `void*`. [`UserData`] turns a weak reference to the callback target
//! into such a pointer and back, so an `extern "C"` trampoline can find its
//! target without any global lookup table.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

/// Owns a boxed `Weak<T>` whose address is handed to the native library.
///
/// The pointer stays valid until this value is dropped, so callbacks must be
/// unregistered first. If they can't be (the process is exiting), call
/// [`leak`](Self::leak) instead of dropping.
pub struct UserData<T> {
    ptr: NonNull<Weak<T>>,
}

// Safety: the box only holds a Weak<T>, which is Send + Sync when T is.
unsafe impl<T: Send + Sync> Send for UserData<T> {}
unsafe impl<T: Send + Sync> Sync for UserData<T> {}

impl<T> UserData<T> {
    pub fn new(target: &Arc<T>) -> Self {
        let boxed = Box::new(Arc::downgrade(target));
        Self {
            ptr: NonNull::from(Box::leak(boxed)),
        }
    }

    /// The `void*` to register alongside the callback.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// Recover the target inside a trampoline. `None` for a null pointer or a
    /// target that has already been dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a value returned by [`as_ptr`](Self::as_ptr) on a
    /// `UserData<T>` that is still alive.
    pub unsafe fn target(ptr: *mut c_void) -> Option<Arc<T>> {
        let weak = unsafe { ptr.cast::<Weak<T>>().as_ref() }?;
        weak.upgrade()
    }

    /// Give up ownership without freeing, for pointers the library may still use.
    pub fn leak(self) {
        std::mem::forget(self);
    }
}

impl<T> Drop for UserData<T> {
    fn drop(&mut self) {
        // Safety: ptr came from Box::leak in `new` and is freed only here.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl<T> std::fmt::Debug for UserData<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UserData").field(&self.ptr).finish()
    }
}
