//! In-order notification delivery on a dedicated thread.
//!
//! Producers (the stack event thread, occasionally caller threads) hand one
//! [`Notification`] at a time to a single worker through a semaphore pair:
//!
//! 1. the producer takes the send guard and stores the notification
//! 2. it posts `signal` and blocks on `done`
//! 3. the worker wakes on `signal`, delivers to the sink, posts `done`
//!
//! So delivery is strictly one-at-a-time and in call order, and a producer
//! returns only after its notification has been handled. [`Notification::Quit`]
//! ends the loop; the worker posts `done` once more as it exits, which is
//! what [`NotificationDispatcher::shutdown`] waits for with a bound.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::sync::BlockingSemaphore;
use crate::tracing_compat::{debug, trace, warn};

/// Something worth telling the upper layer about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Stop the dispatcher loop.
    Quit,
    /// A tag entered the field.
    TagInsert,
    /// The tag left the field.
    TagRemove,
    /// A secure-element transaction completed.
    Transaction {
        /// Application identifier.
        aid: Vec<u8>,
        /// Transaction payload.
        data: Vec<u8>,
    },
    /// A peer-to-peer target was activated.
    P2pActivation,
    /// The RF field came up.
    FieldOn,
    /// The RF field went away.
    FieldOff,
}

/// Receiver of dispatched notifications, called on the dispatcher thread.
pub trait NotificationSink: Send + Sync {
    /// Handles one notification. Blocking here blocks the producer.
    fn notify(&self, notification: &Notification);
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Option<Notification>>,
    signal: BlockingSemaphore,
    done: BlockingSemaphore,
}

#[derive(Debug)]
struct SendState {
    running: bool,
}

/// Single-threaded, in-order notification dispatcher.
#[derive(Debug)]
pub struct NotificationDispatcher {
    shared: Arc<Shared>,
    send_guard: Mutex<SendState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Spawns the worker thread delivering to `sink`.
    pub fn start(sink: Arc<dyn NotificationSink>, thread_name: &str) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            signal: BlockingSemaphore::new(0),
            done: BlockingSemaphore::new(0),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || run(&shared, sink.as_ref()))?
        };
        debug!(thread = thread_name, "notification dispatcher started");
        Ok(Self {
            shared,
            send_guard: Mutex::new(SendState { running: true }),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Delivers `notification` and returns once the sink has handled it.
    ///
    /// After shutdown the notification is dropped with a warning.
    pub fn signal(&self, notification: Notification) {
        let state = self.send_guard.lock();
        if !state.running {
            warn!(?notification, "notification after dispatcher shutdown dropped");
            return;
        }
        self.handoff(notification);
        drop(state);
    }

    /// Returns true until [`shutdown`](Self::shutdown) has been called.
    pub fn is_running(&self) -> bool {
        self.send_guard.lock().running
    }

    /// Stops the worker, waiting at most `timeout` for it to exit.
    ///
    /// Returns false if the worker did not confirm its exit in time; it is
    /// then left detached. Calling this twice is harmless.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let mut state = self.send_guard.lock();
        if !state.running {
            return true;
        }
        state.running = false;
        self.handoff(Notification::Quit);
        drop(state);

        if !self.shared.done.wait_timeout(timeout) {
            warn!(?timeout, "notification thread did not exit in time");
            self.worker.lock().take();
            return false;
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("notification thread panicked");
            }
        }
        debug!("notification dispatcher stopped");
        true
    }

    fn handoff(&self, notification: Notification) {
        trace!(?notification, "notification queued");
        *self.shared.slot.lock() = Some(notification);
        self.shared.signal.post();
        self.shared.done.wait();
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        if self.send_guard.get_mut().running {
            self.shutdown(Duration::from_secs(2));
        }
    }
}

fn run(shared: &Shared, sink: &dyn NotificationSink) {
    loop {
        shared.signal.wait();
        let notification = shared.slot.lock().take();
        let quit = match notification {
            Some(Notification::Quit) => true,
            Some(notification) => {
                sink.notify(&notification);
                false
            }
            None => {
                warn!("dispatcher woke without a notification");
                false
            }
        };
        shared.done.post();
        if quit {
            break;
        }
    }
    trace!("notification loop exiting");
    shared.done.post();
}
