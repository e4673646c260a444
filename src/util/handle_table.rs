//! Generation-checked handle table for socket records.
//!
//! Sockets are handed out as [`SocketId`]s instead of raw pointers. An id is
//! an index plus the generation of the slot at insertion time, so an id that
//! outlives its socket (or whose slot was reused) never resolves again.
//!
//! # Design
//!
//! - Records live in a `Vec` of slots; removed slots go on a free list
//! - Every removal bumps the slot generation
//! - No unsafe code; lookups are bounds- and generation-checked

use core::fmt;

/// Opaque capability for one socket record.
///
/// This is the value stored in the platform object's handle field and the
/// context registered with the lower stack for completion callbacks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId {
    index: u32,
    generation: u32,
}

impl SocketId {
    /// Creates an id from its parts (primarily for testing).
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the id into an integer-sized platform field.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpacks an id previously produced by [`SocketId::to_raw`].
    ///
    /// Any integer is accepted; a forged or stale value simply fails to
    /// resolve in the table.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Debug for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketId({}:{})", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

/// Slot table keyed by [`SocketId`].
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of live records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no record is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns its id, reusing a vacant slot if any.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert(&mut self, value: T) -> SocketId {
        let id = if let Some(free_index) = self.free_head {
            let slot = &mut self.slots[free_index as usize];
            let Slot::Vacant {
                next_free,
                generation,
            } = *slot
            else {
                unreachable!("free list pointed to occupied slot");
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { value, generation };
            SocketId::new(free_index, generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("socket table overflow");
            self.slots.push(Slot::Occupied {
                value,
                generation: 0,
            });
            SocketId::new(index, 0)
        };
        self.len += 1;
        id
    }

    /// Removes and returns the record for `id`; `None` if stale.
    pub fn remove(&mut self, id: SocketId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => {
                let vacant = Slot::Vacant {
                    next_free: self.free_head,
                    generation: generation.wrapping_add(1),
                };
                let Slot::Occupied { value, .. } = core::mem::replace(slot, vacant) else {
                    unreachable!("slot checked occupied above");
                };
                self.free_head = Some(id.index);
                self.len -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    /// Looks up the record for `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: SocketId) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { value, generation } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Looks up the record for `id` mutably.
    #[inline]
    pub fn get_mut(&mut self, id: SocketId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { value, generation } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Returns true if `id` resolves to a live record.
    #[must_use]
    pub fn contains(&self, id: SocketId) -> bool {
        self.get(id).is_some()
    }

    /// Ids of all live records, in slot order.
    pub fn ids(&self) -> impl Iterator<Item = SocketId> + '_ {
        self.slots
            .iter()
            .zip(0u32..)
            .filter_map(|(slot, index)| match slot {
                Slot::Occupied { generation, .. } => Some(SocketId::new(index, *generation)),
                Slot::Vacant { .. } => None,
            })
    }
}
