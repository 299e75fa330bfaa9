//! Opaque native handles.

use std::fmt;
use std::num::NonZeroUsize;

use crate::error::{CoreError, Result};

/// Pointer-sized identifier of an object owned by the native library.
///
/// Never dereferenced here. Two handles are the same object iff their raw
/// values are equal. Zero is not representable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(NonZeroUsize);

impl NativeHandle {
    /// Wrap a raw handle value, rejecting zero.
    pub fn new(raw: usize) -> Result<Self> {
        NonZeroUsize::new(raw).map(Self).ok_or(CoreError::InvalidHandle)
    }

    /// Wrap a native pointer, rejecting null.
    pub fn from_ptr<T>(ptr: *const T) -> Result<Self> {
        Self::new(ptr as usize)
    }

    /// The raw value as the native library knows it.
    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0.get())
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}
