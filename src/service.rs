//! The service context and its lifecycle host.
//!
//! [`NfcService`] owns everything the core needs: configuration, the lower
//! stack, the socket list, the hardware-serialization lock and the
//! notification dispatcher. It is passed explicitly to callers (usually as
//! an `Arc`); there is no process-wide state.
//!
//! [`ServiceHost`] is the init/deinit gate around one optional service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::{LinkProperty, LlcpLinkConfig, ServiceConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::llcp::LlcpSocket;
use crate::notify::{Notification, NotificationDispatcher, NotificationSink};
use crate::stack::{DetectedKind, LowerStack, StackEvent};
use crate::sync::SocketList;
use crate::tracing_compat::{debug, info, trace, warn};

/// Explicit service context shared by every core operation.
pub struct NfcService<S: LowerStack> {
    pub(crate) config: ServiceConfig,
    pub(crate) stack: S,
    pub(crate) sockets: SocketList<LlcpSocket>,
    pub(crate) hardware_lock: Mutex<()>,
    link: Mutex<LlcpLinkConfig>,
    running: AtomicBool,
    notifier: NotificationDispatcher,
}

impl<S: LowerStack> std::fmt::Debug for NfcService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NfcService")
            .field("config", &self.config)
            .field("sockets", &self.sockets.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<S: LowerStack> NfcService<S> {
    /// Validates `config`, applies the link parameters to the stack and
    /// starts the notification dispatcher.
    pub fn new(stack: S, sink: Arc<dyn NotificationSink>, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        stack.configure_link(&config.link).map_err(|err| {
            Error::from(err).with_message("link configuration rejected")
        })?;
        debug!(link = ?config.link, "link configured");
        let notifier = NotificationDispatcher::start(sink, &config.dispatcher.thread_name)
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("cannot spawn notification thread")
                    .with_source(err)
            })?;
        Ok(Self {
            link: Mutex::new(config.link),
            config,
            stack,
            sockets: SocketList::new(),
            hardware_lock: Mutex::new(()),
            running: AtomicBool::new(true),
            notifier,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Local LLCP link parameters the stack was last configured with.
    pub fn link_config(&self) -> LlcpLinkConfig {
        *self.link.lock()
    }

    /// Changes one link parameter and reapplies the link configuration.
    ///
    /// Out-of-range values are rejected before the stack is touched. If the
    /// stack refuses the new parameters, the previous ones stay in effect.
    pub fn set_link_property(&self, property: LinkProperty, value: u64) -> Result<()> {
        let _hardware = self.hardware_lock.lock();
        let mut link = self.link.lock();
        let mut updated = *link;
        updated.set(property, value)?;
        self.stack.configure_link(&updated).map_err(|err| {
            warn!(?property, value, error = %err, "link property rejected");
            Error::from(err).with_message("link configuration rejected")
        })?;
        *link = updated;
        debug!(?property, value, "link property set");
        Ok(())
    }

    /// Returns false once [`shutdown`](Self::shutdown) has started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::shut_down())
        }
    }

    /// The lower stack.
    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// The socket list.
    pub fn sockets(&self) -> &SocketList<LlcpSocket> {
        &self.sockets
    }

    /// Number of live sockets.
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Runs `f` while holding the lock that serializes direct hardware access.
    pub fn with_hardware<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let _hardware = self.hardware_lock.lock();
        f(&self.stack)
    }

    /// Routes one lower-stack event to the socket adapter or the dispatcher.
    pub fn handle_stack_event(&self, event: StackEvent) {
        trace!(?event, "stack event");
        match event {
            StackEvent::TagDetected { kind } => match kind {
                DetectedKind::P2pTarget => self.notifier.signal(Notification::P2pActivation),
                DetectedKind::CardEmulation => debug!("card emulation activation ignored"),
                DetectedKind::Tag => self.notifier.signal(Notification::TagInsert),
            },
            StackEvent::TagRemoved => self.notifier.signal(Notification::TagRemove),
            StackEvent::Connected { context, params } => {
                self.on_session_established(context, params);
            }
            StackEvent::ConnectIndication { context, session } => {
                self.on_session_indication(context, session);
            }
            StackEvent::ConnectProceeding { context } => {
                debug!(socket = ?context, "connect proceeding");
            }
            StackEvent::ConnectFailed { context, reason } => {
                self.on_session_failed(context, reason);
            }
            StackEvent::Disconnected { context, reason } => {
                self.on_session_disconnected(context, reason);
            }
            StackEvent::HangupTerminated { context } => self.on_session_terminated(context),
            StackEvent::DataTransmitted { context } => self.on_data_transmitted(context),
            StackEvent::DataIndication { context, data } => {
                self.on_data_indication(context, &data);
            }
            StackEvent::ReaderRequest => debug!("reader request ignored"),
            StackEvent::Transaction { aid, data } => {
                self.notifier.signal(Notification::Transaction { aid, data });
            }
            StackEvent::FieldActivity { on } => self.notifier.signal(if on {
                Notification::FieldOn
            } else {
                Notification::FieldOff
            }),
        }
    }

    /// Tears down every remaining socket, ejecting blocked callers.
    ///
    /// Sockets added by callers ejected during the sweep are torn down too;
    /// the list is empty on return. Returns how many sockets were freed.
    pub fn discard_sockets(&self) -> usize {
        let mut list = self.sockets.lock();
        let mut freed = 0;
        loop {
            let ids = list.ids();
            if ids.is_empty() {
                break;
            }
            for id in ids {
                list.interrupt(id);
                // A close running concurrently may have freed it while we waited.
                if list.exists(id) && list.remove(id).is_some() {
                    freed += 1;
                }
            }
        }
        if freed > 0 {
            debug!(freed, "sockets discarded");
        }
        freed
    }

    /// Refuses new socket work, discards all sockets and stops the
    /// dispatcher.
    ///
    /// Returns false if the dispatcher thread did not exit within the
    /// configured shutdown timeout.
    pub fn shutdown(&self) -> bool {
        self.running.store(false, Ordering::Release);
        self.discard_sockets();
        self.notifier.shutdown(self.config.timeouts.shutdown_timeout)
    }
}

/// Init/deinit gate around the current service.
pub struct ServiceHost<S: LowerStack> {
    current: Mutex<Option<Arc<NfcService<S>>>>,
}

impl<S: LowerStack> Default for ServiceHost<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LowerStack> ServiceHost<S> {
    /// Creates a host with no service.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Creates the service. Fails if one is already initialized.
    pub fn initialize(
        &self,
        stack: S,
        sink: Arc<dyn NotificationSink>,
        config: ServiceConfig,
    ) -> Result<Arc<NfcService<S>>> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(Error::new(ErrorKind::AlreadyInitialized));
        }
        let service = Arc::new(NfcService::new(stack, sink, config)?);
        *current = Some(Arc::clone(&service));
        info!("nfc service initialized");
        Ok(service)
    }

    /// Tears the service down.
    ///
    /// Blocked socket callers are released, every socket is freed and the
    /// dispatcher is stopped. Returns `Ok(false)` if the dispatcher did not
    /// exit in time.
    pub fn deinitialize(&self) -> Result<bool> {
        let mut current = self.current.lock();
        let Some(service) = current.take() else {
            return Err(Error::new(ErrorKind::NotInitialized));
        };
        let stopped = service.shutdown();
        if stopped {
            info!("nfc service deinitialized");
        } else {
            warn!("nfc service deinitialized; notification thread still running");
        }
        Ok(stopped)
    }

    /// The current service, if initialized.
    pub fn service(&self) -> Option<Arc<NfcService<S>>> {
        self.current.lock().clone()
    }

    /// Returns true while a service is initialized.
    pub fn is_initialized(&self) -> bool {
        self.current.lock().is_some()
    }
}
