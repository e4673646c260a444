//! Synchronization primitives for the socket core.
//!
//! # Primitives
//!
//! - [`SocketList`]: socket table with shared ownership, sticky event bits
//!   and a draining interrupt, all behind one mutex and one broadcast gate
//! - [`WaitEvents`]: the event bits a socket waiter can block on
//! - [`BlockingSemaphore`]: counting semaphore used for thread handoff
//!
//! Every primitive here parks OS threads; there is no async scheduler in
//! this crate.

mod event;
mod semaphore;
mod socket_list;

pub use event::WaitEvents;
pub use semaphore::BlockingSemaphore;
pub use socket_list::{ListGuard, NodeState, OwnedNode, SocketList, SuspendOutcome};
