//! Wake-reason bits carried by every socket node.
//!
//! Bits are sticky: a producer ORs them in with
//! [`ListGuard::post_event`](super::ListGuard::post_event) and they stay set
//! until the owner that consumed them clears them. CLOSE is never cleared by
//! ordinary waiters so that every thread blocked on a closing socket sees it.
//!
//! ```ignore
//! use nfc_llcp_core::WaitEvents;
//!
//! let wanted = WaitEvents::CONNECT | WaitEvents::CONNECT_FAILED;
//! assert!(wanted.intersects(WaitEvents::CONNECT_FAILED));
//! ```

use core::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Set of pending wake reasons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct WaitEvents(u8);

impl WaitEvents {
    /// Empty set.
    pub const NONE: Self = Self(0);

    /// Session established (or incoming session on a listening socket).
    pub const CONNECT: Self = Self(1 << 0);

    /// Inbound payload queued in the ring buffer.
    pub const READ: Self = Self(1 << 1);

    /// Outbound payload acknowledged by the lower stack.
    pub const WRITE: Self = Self(1 << 2);

    /// Session terminated or disconnected.
    pub const CLOSE: Self = Self(1 << 3);

    /// Session could not be established.
    pub const CONNECT_FAILED: Self = Self(1 << 4);

    const ALL: u8 = 0x1f;

    /// Creates a set from raw bits, dropping unknown ones.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// True if no bit is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True if `self` and `other` share at least one bit.
    #[must_use]
    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Adds the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl fmt::Debug for WaitEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(WaitEvents, &str); 5] = [
            (WaitEvents::CONNECT, "CONNECT"),
            (WaitEvents::READ, "READ"),
            (WaitEvents::WRITE, "WRITE"),
            (WaitEvents::CLOSE, "CLOSE"),
            (WaitEvents::CONNECT_FAILED, "CONNECT_FAILED"),
        ];
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl BitOr for WaitEvents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WaitEvents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for WaitEvents {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for WaitEvents {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for WaitEvents {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL)
    }
}
