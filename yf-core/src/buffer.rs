//! Host-visible buffer handle.
//!
//! Grounded on `buffer.h`'s `YF_buffer_o` (ctx, VkBuffer, VkDeviceMemory,
//! size, mapped pointer). Allocation and mapping are a non-goal here: a
//! [`Buffer`] is constructed from an already-allocated `vk::Buffer` and is
//! otherwise a cloneable, identity-comparable handle for the command
//! subsystem to record against.

use std::sync::Arc;

use ash::vk;

struct Inner {
    handle: vk::Buffer,
    size: u64,
}

/// A buffer resource as seen by the command subsystem.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<Inner>,
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.inner.handle)
            .field("size", &self.inner.size)
            .finish()
    }
}

impl Buffer {
    /// Wraps an existing `vk::Buffer` for use with the command subsystem.
    pub fn from_raw(handle: vk::Buffer, size: u64) -> Self {
        Buffer {
            inner: Arc::new(Inner { handle, size }),
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.inner.handle
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_identity_equal_but_independent_wrap_is_not() {
        let a = Buffer::from_raw(vk::Buffer::null(), 256);
        let b = a.clone();
        let c = Buffer::from_raw(vk::Buffer::null(), 256);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn accessors_report_constructed_values() {
        let buf = Buffer::from_raw(vk::Buffer::null(), 4096);
        assert_eq!(buf.size(), 4096);
        assert_eq!(buf.handle(), vk::Buffer::null());
    }
}
