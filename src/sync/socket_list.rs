//! The socket list: ownership, events and interruption for socket nodes.
//!
//! Every socket record lives in one [`SocketList`]. A single mutex guards the
//! table and every node's state, and a single condition variable is the wake
//! gate for all nodes. Waiters re-check their own predicate after every
//! broadcast, so one gate serves any number of sockets.
//!
//! # Protocol
//!
//! Each node carries three pieces of state (see [`NodeState`]):
//!
//! - `event`: sticky wake reasons, set by producers, cleared by consumers
//! - `interrupted`: one-way teardown flag; once set no new owner is admitted
//! - `owners`: how many threads currently hold the node
//!
//! A caller that wants to read, mutate or wait on a node first acquires
//! ownership while holding the list lock. Teardown calls
//! [`ListGuard::interrupt`], which sets the flag, wakes every waiter and
//! blocks until the owner count drains to zero. Only then may the node be
//! removed. A node with owners can never be removed, so a live
//! [`OwnedNode`] always refers to a present record.
//!
//! # Example
//!
//! ```ignore
//! let list = SocketList::new();
//! let mut guard = list.lock();
//! let id = guard.add(record);
//! if let Some(mut node) = guard.own(id) {
//!     match node.suspend(WaitEvents::READ | WaitEvents::CLOSE) {
//!         SuspendOutcome::Woken(events) => node.clear(events & WaitEvents::READ),
//!         SuspendOutcome::Interrupted => {}
//!     }
//! }
//! ```

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::WaitEvents;
use crate::tracing_compat::{debug, error, trace, warn};
use crate::util::{HandleTable, SocketId};

/// Synchronization state embedded in every socket node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeState {
    event: WaitEvents,
    interrupted: bool,
    owners: usize,
}

impl NodeState {
    /// Fresh state: no events, not interrupted, no owners.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            event: WaitEvents::NONE,
            interrupted: false,
            owners: 0,
        }
    }

    /// Pending wake reasons.
    #[must_use]
    pub const fn events(&self) -> WaitEvents {
        self.event
    }

    /// True once teardown has started.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Number of current owners.
    #[must_use]
    pub const fn owners(&self) -> usize {
        self.owners
    }
}

/// Result of [`ListGuard::suspend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendOutcome {
    /// A wanted bit is pending; carries every pending bit at wake time.
    /// The caller clears what it consumed.
    Woken(WaitEvents),
    /// The node was interrupted. Event bits were left untouched.
    Interrupted,
}

#[derive(Debug)]
struct Node<T> {
    state: NodeState,
    value: T,
}

/// Socket table guarded by one mutex and one broadcast gate.
#[derive(Debug)]
pub struct SocketList<T> {
    nodes: Mutex<HandleTable<Node<T>>>,
    gate: Condvar,
    close_lock: Mutex<()>,
}

impl<T> Default for SocketList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SocketList<T> {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Mutex::new(HandleTable::new()),
            gate: Condvar::new(),
            close_lock: Mutex::new(()),
        }
    }

    /// Acquires the list lock.
    pub fn lock(&self) -> ListGuard<'_, T> {
        ListGuard {
            nodes: self.nodes.lock(),
            gate: &self.gate,
        }
    }

    /// Acquires the close lock.
    ///
    /// Close paths take this before the list lock so that two callers
    /// holding aliases of one socket cannot both run its teardown.
    pub fn lock_close(&self) -> MutexGuard<'_, ()> {
        self.close_lock.lock()
    }

    /// Number of sockets in the list.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Returns true if the list holds no socket.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to the list; dropping it releases the lock.
pub struct ListGuard<'a, T> {
    nodes: MutexGuard<'a, HandleTable<Node<T>>>,
    gate: &'a Condvar,
}

impl<'a, T> ListGuard<'a, T> {
    /// Releases the list lock.
    pub fn release(self) {}

    /// Inserts a record with fresh node state and returns its id.
    ///
    /// Ids are never reused while live, so a record cannot be added twice.
    pub fn add(&mut self, value: T) -> SocketId {
        let id = self.nodes.insert(Node {
            state: NodeState::new(),
            value,
        });
        trace!(socket = ?id, sockets = self.nodes.len(), "socket added");
        id
    }

    /// Unlinks a record and hands it back for freeing.
    ///
    /// Refuses (and logs) when the id is unknown or the node still has
    /// owners; interrupt first.
    pub fn remove(&mut self, id: SocketId) -> Option<T> {
        match self.nodes.get(id) {
            None => {
                error!(socket = ?id, "removing a socket that is not in the list; should never happen");
                return None;
            }
            Some(node) if node.state.owners > 0 => {
                error!(
                    socket = ?id,
                    owners = node.state.owners,
                    "removing a socket that still has owners; should never happen"
                );
                return None;
            }
            Some(_) => {}
        }
        let node = self.nodes.remove(id)?;
        trace!(socket = ?id, sockets = self.nodes.len(), "socket removed");
        Some(node.value)
    }

    /// Returns true if `id` names a socket in the list.
    #[must_use]
    pub fn exists(&self, id: SocketId) -> bool {
        self.nodes.contains(id)
    }

    /// Number of sockets in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the list holds no socket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every socket currently in the list.
    #[must_use]
    pub fn ids(&self) -> Vec<SocketId> {
        self.nodes.ids().collect()
    }

    /// Node state snapshot.
    #[must_use]
    pub fn state(&self, id: SocketId) -> Option<NodeState> {
        self.nodes.get(id).map(|node| node.state)
    }

    /// Record access under the list lock, without ownership.
    #[must_use]
    pub fn get(&self, id: SocketId) -> Option<&T> {
        self.nodes.get(id).map(|node| &node.value)
    }

    /// Mutable record access under the list lock, without ownership.
    pub fn get_mut(&mut self, id: SocketId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|node| &mut node.value)
    }

    /// Registers the caller as an owner of `id`.
    ///
    /// Returns false when the socket is gone or being torn down. That is not
    /// an error: the caller abandons its operation.
    pub fn acquire_ownership(&mut self, id: SocketId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            debug!(socket = ?id, "ownership denied: socket not in list");
            return false;
        };
        if node.state.interrupted {
            debug!(socket = ?id, "ownership denied: socket interrupted");
            return false;
        }
        node.state.owners += 1;
        trace!(socket = ?id, owners = node.state.owners, "ownership acquired");
        true
    }

    /// Drops one ownership of `id`, waking a pending interrupt on the last one.
    pub fn release_ownership(&mut self, id: SocketId) {
        let Some(node) = self.nodes.get_mut(id) else {
            error!(socket = ?id, "releasing ownership of a socket not in the list; should never happen");
            return;
        };
        if node.state.owners == 0 {
            error!(socket = ?id, "ownership released more often than acquired; should never happen");
            return;
        }
        node.state.owners -= 1;
        trace!(socket = ?id, owners = node.state.owners, "ownership released");
        if node.state.owners == 0 && node.state.interrupted {
            self.gate.notify_all();
        }
    }

    /// Acquires ownership and returns a guard that releases it on drop.
    pub fn own(&mut self, id: SocketId) -> Option<OwnedNode<'_, 'a, T>> {
        if !self.acquire_ownership(id) {
            return None;
        }
        Some(OwnedNode { list: self, id })
    }

    /// Sets `mask` on the node and wakes every waiter.
    ///
    /// Returns false if the socket is not in the list.
    pub fn post_event(&mut self, id: SocketId, mask: WaitEvents) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            warn!(socket = ?id, events = ?mask, "event for a socket not in the list");
            return false;
        };
        node.state.event |= mask;
        trace!(socket = ?id, posted = ?mask, pending = ?node.state.event, "event posted");
        self.gate.notify_all();
        true
    }

    /// Clears `mask` on the node.
    pub fn clear_events(&mut self, id: SocketId, mask: WaitEvents) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.state.event.remove(mask);
        }
    }

    /// Pending event bits of `id` (empty if unknown).
    #[must_use]
    pub fn pending_events(&self, id: SocketId) -> WaitEvents {
        self.nodes
            .get(id)
            .map_or(WaitEvents::NONE, |node| node.state.event)
    }

    /// Blocks until a bit in `wait_for` is pending or the node is interrupted.
    ///
    /// The predicate is checked before the first wait, so a completion that
    /// was posted before the call is never missed. The list lock is released
    /// while parked. The caller must own the node.
    pub fn suspend(&mut self, id: SocketId, wait_for: WaitEvents) -> SuspendOutcome {
        loop {
            let Some(node) = self.nodes.get(id) else {
                error!(socket = ?id, "suspending on a socket that is not in the list; should never happen");
                return SuspendOutcome::Interrupted;
            };
            debug_assert!(node.state.owners > 0, "suspend without ownership");
            if node.state.interrupted {
                trace!(socket = ?id, "suspend ended by interrupt");
                return SuspendOutcome::Interrupted;
            }
            let pending = node.state.event;
            if pending.intersects(wait_for) {
                trace!(socket = ?id, pending = ?pending, "suspend woke on event");
                return SuspendOutcome::Woken(pending);
            }
            self.gate.wait(&mut self.nodes);
        }
    }

    /// Starts teardown of `id` and waits until every owner has left.
    ///
    /// On return no thread holds ownership and none can acquire it, so the
    /// socket may be removed. The caller must not own the node itself.
    pub fn interrupt(&mut self, id: SocketId) {
        let Some(node) = self.nodes.get_mut(id) else {
            warn!(socket = ?id, "interrupting a socket not in the list");
            return;
        };
        node.state.interrupted = true;
        if node.state.owners == 0 {
            trace!(socket = ?id, "socket interrupted with no owners");
            return;
        }
        debug!(socket = ?id, owners = node.state.owners, "interrupting socket, waiting for owners");
        self.gate.notify_all();
        loop {
            self.gate.wait(&mut self.nodes);
            match self.nodes.get(id) {
                Some(node) if node.state.owners > 0 => {}
                _ => break,
            }
        }
        debug!(socket = ?id, "socket drained");
    }
}

/// Ownership of one node for the lifetime of the guard.
///
/// Borrowing the [`ListGuard`] keeps the list lock held (except while
/// suspended). Dropping it releases the ownership.
pub struct OwnedNode<'g, 'a, T> {
    list: &'g mut ListGuard<'a, T>,
    id: SocketId,
}

impl<'a, T> OwnedNode<'_, 'a, T> {
    /// The owned socket's id.
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// The owned record.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.node().value
    }

    /// The owned record, mutably.
    pub fn get_mut(&mut self) -> &mut T {
        let id = self.id;
        &mut self
            .list
            .nodes
            .get_mut(id)
            .expect("owned socket left the list")
            .value
    }

    /// Pending event bits.
    #[must_use]
    pub fn events(&self) -> WaitEvents {
        self.node().state.event
    }

    /// Clears consumed event bits.
    pub fn clear(&mut self, mask: WaitEvents) {
        self.list.clear_events(self.id, mask);
    }

    /// Posts event bits and wakes all waiters.
    pub fn post(&mut self, mask: WaitEvents) {
        self.list.post_event(self.id, mask);
    }

    /// See [`ListGuard::suspend`].
    pub fn suspend(&mut self, wait_for: WaitEvents) -> SuspendOutcome {
        self.list.suspend(self.id, wait_for)
    }

    /// The underlying list guard, e.g. to add a record while owning this one.
    pub fn list(&mut self) -> &mut ListGuard<'a, T> {
        self.list
    }

    fn node(&self) -> &Node<T> {
        self.list
            .nodes
            .get(self.id)
            .expect("owned socket left the list")
    }
}

impl<T> Drop for OwnedNode<'_, '_, T> {
    fn drop(&mut self) {
        self.list.release_ownership(self.id);
    }
}
