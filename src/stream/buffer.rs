//! Owned byte buffers with release accounting.
//!
//! A [`Buffer`] is released exactly once: when it is dropped, when it is
//! consumed by [`Buffer::into_bytes`], or explicitly through
//! [`Buffer::release`]. Buffers minted by a [`BufferTracker`] report their
//! release back to it, which lets callers observe how much body memory is
//! still held downstream.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

/// Counts buffers that have been handed out and not yet released.
#[derive(Clone, Default)]
pub struct BufferTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
}

impl BufferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `bytes` in a buffer accounted against this tracker.
    pub fn track(&self, bytes: impl Into<Bytes>) -> Buffer {
        let bytes = bytes.into();
        self.inner.live_buffers.fetch_add(1, Ordering::AcqRel);
        self.inner.live_bytes.fetch_add(bytes.len(), Ordering::AcqRel);
        Buffer {
            lease: Some(Lease {
                tracker: self.clone(),
                len: bytes.len(),
            }),
            bytes,
        }
    }

    /// Buffers minted by this tracker that are still alive.
    pub fn live_buffers(&self) -> usize {
        self.inner.live_buffers.load(Ordering::Acquire)
    }

    /// Total size of the buffers still alive.
    pub fn live_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::Acquire)
    }
}

impl fmt::Debug for BufferTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferTracker")
            .field("live_buffers", &self.live_buffers())
            .field("live_bytes", &self.live_bytes())
            .finish()
    }
}

struct Lease {
    tracker: BufferTracker,
    len: usize,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let inner = &self.tracker.inner;
        inner.live_buffers.fetch_sub(1, Ordering::AcqRel);
        inner.live_bytes.fetch_sub(self.len, Ordering::AcqRel);
    }
}

/// An immutable view over a byte range, owned by exactly one holder.
pub struct Buffer {
    bytes: Bytes,
    lease: Option<Lease>,
}

impl Buffer {
    /// An untracked buffer.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            lease: None,
        }
    }

    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content(&self) -> &[u8] {
        &self.bytes
    }

    /// The tracker this buffer reports its release to, if any.
    pub fn tracker(&self) -> Option<&BufferTracker> {
        self.lease.as_ref().map(|lease| &lease.tracker)
    }

    /// Hand the bytes out of the tracked domain. The buffer counts as released.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Release the buffer. Equivalent to dropping it.
    pub fn release(self) {}
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.bytes.len())
            .field("tracked", &self.lease.is_some())
            .finish()
    }
}

impl From<Bytes> for Buffer {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<&'static str> for Buffer {
    fn from(s: &'static str) -> Self {
        Self::new(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}
