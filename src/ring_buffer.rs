//! Growable circular byte queue for inbound LLCP payload.
//!
//! A [`RingBuffer`] belongs to exactly one socket and is only touched while
//! that socket's node is owned, so it has no lock of its own.
//!
//! Invariants, after every operation:
//!
//! - `data_available() + free_available() == capacity()`
//! - both cursors are `< capacity()` (or zero when capacity is zero)
//! - unread bytes come out in the order they were written
//!
//! When a write does not fit the backing store grows by exactly the write
//! length. Unread bytes are linearized to offset zero during growth so a
//! wrapped buffer keeps its order.

use crate::tracing_compat::{trace, warn};

/// Circular byte queue with grow-on-overflow.
#[derive(Debug, Default)]
pub struct RingBuffer {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    used: usize,
}

impl RingBuffer {
    /// Creates a zero-capacity buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: Vec::new(),
            read_pos: 0,
            write_pos: 0,
            used: 0,
        }
    }

    /// Sizes the buffer to `capacity` bytes, dropping any content.
    ///
    /// Returns false if the allocation fails; the buffer is then left with
    /// zero capacity and every operation on it is a safe no-op.
    pub fn allocate(&mut self, capacity: usize) -> bool {
        *self = Self::new();
        let mut storage = Vec::new();
        if storage.try_reserve_exact(capacity).is_err() {
            warn!(capacity, "ring buffer allocation failed");
            return false;
        }
        storage.resize(capacity, 0);
        self.storage = storage;
        true
    }

    /// Total bytes the buffer can hold without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes waiting to be read.
    #[must_use]
    pub const fn data_available(&self) -> usize {
        self.used
    }

    /// Bytes that can be written without growing.
    #[must_use]
    pub fn free_available(&self) -> usize {
        self.capacity() - self.used
    }

    /// Returns true if nothing is waiting to be read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Appends `data`, growing by `data.len()` bytes if it does not fit.
    ///
    /// Returns false, copying nothing, only if growth fails to allocate.
    pub fn write(&mut self, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        if data.len() > self.free_available() && !self.grow(data.len()) {
            return false;
        }

        let capacity = self.capacity();
        let first = data.len().min(capacity - self.write_pos);
        self.storage[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        self.storage[..rest].copy_from_slice(&data[first..]);

        self.write_pos = (self.write_pos + data.len()) % capacity;
        self.used += data.len();
        true
    }

    /// Fills `out` completely from the front of the queue.
    ///
    /// Returns false, copying nothing, if fewer than `out.len()` bytes are
    /// available.
    pub fn read(&mut self, out: &mut [u8]) -> bool {
        if out.len() > self.used {
            return false;
        }
        if out.is_empty() {
            return true;
        }

        let capacity = self.capacity();
        let first = out.len().min(capacity - self.read_pos);
        out[..first].copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.storage[..rest]);

        self.used -= out.len();
        if self.used == 0 {
            self.read_pos = 0;
            self.write_pos = 0;
        } else {
            self.read_pos = (self.read_pos + out.len()) % capacity;
        }
        true
    }

    /// Reads `min(out.len(), data_available())` bytes and returns the count.
    pub fn read_available(&mut self, out: &mut [u8]) -> usize {
        let amount = out.len().min(self.used);
        if self.read(&mut out[..amount]) {
            amount
        } else {
            0
        }
    }

    /// Drops all unread bytes, keeping the allocation.
    pub fn clear(&mut self) {
        if self.used > 0 {
            trace!(discarded = self.used, "ring buffer cleared");
        }
        self.read_pos = 0;
        self.write_pos = 0;
        self.used = 0;
    }

    fn grow(&mut self, extra: usize) -> bool {
        let Some(new_capacity) = self.capacity().checked_add(extra) else {
            warn!(extra, "ring buffer growth overflows usize");
            return false;
        };
        let mut storage = Vec::new();
        if storage.try_reserve_exact(new_capacity).is_err() {
            warn!(new_capacity, "ring buffer growth allocation failed");
            return false;
        }

        let first = self.used.min(self.capacity() - self.read_pos);
        storage.extend_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        storage.extend_from_slice(&self.storage[..self.used - first]);
        storage.resize(new_capacity, 0);

        trace!(
            old_capacity = self.capacity(),
            new_capacity,
            unread = self.used,
            "ring buffer grown"
        );
        self.storage = storage;
        self.read_pos = 0;
        self.write_pos = self.used;
        true
    }
}
