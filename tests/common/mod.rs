//! Shared harness for the integration tests.
//!
//! [`MockStack`] plays the lower NFC stack: it records every request and,
//! depending on its [`MockBehavior`], answers with completions. Completions
//! never come back inside the request call; they go through a channel to a
//! single "hardware" thread that feeds them to
//! [`NfcService::handle_stack_event`], the way a real stack delivers them.

#![allow(dead_code, unused_macros)]

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Once, Weak};
use std::thread;
use std::time::{Duration, Instant};

use nfc_llcp_core::config::ServiceProfile;
use nfc_llcp_core::stack::{
    ConnectRequest, ConnectionHandle, LinkHandle, ListenRequest, ServerHandle, SessionParams,
};
use nfc_llcp_core::{
    LlcpLinkConfig, LowerStack, NfcService, Notification, NotificationSink, ServiceConfig, SocketId, StackError,
    StackEvent,
};
use parking_lot::Mutex;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nfc_llcp_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Proptest configuration with a fixed case count.
pub fn test_proptest_config(cases: u32) -> proptest::test_runner::Config {
    proptest::test_runner::Config {
        cases,
        ..proptest::test_runner::Config::default()
    }
}

macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = %$name, "=== TEST START ===");
    };
}

macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- section ---");
    };
}

macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "=== TEST COMPLETE ===");
    };
}

macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {{
        let passed: bool = $cond;
        tracing::debug!(
            check = %$what,
            expected = ?$expected,
            actual = ?$actual,
            passed,
            "assertion"
        );
        assert!(passed, "{}: expected {:?}, got {:?}", $what, $expected, $actual);
    }};
}

/// Polls `check` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Gives a thread time to park on a socket before the test injects events.
pub fn settle() {
    thread::sleep(Duration::from_millis(50));
}

/// One request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ConfigureLink(LlcpLinkConfig),
    Connect {
        context: SocketId,
        request: ConnectRequest,
    },
    Listen {
        context: SocketId,
        request: ListenRequest,
    },
    ConnectResponse {
        connection: ConnectionHandle,
        context: SocketId,
    },
    Disconnect(LinkHandle),
    Data {
        connection: ConnectionHandle,
        data: Vec<u8>,
    },
    DataResponse(ConnectionHandle),
}

/// How a connect request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReply {
    /// `Connected` with [`MockBehavior::remote`].
    Establish,
    /// `ConnectFailed` with the given reason.
    Fail(u32),
    /// Synchronous rejection.
    Reject(u32),
    /// Accepted, but no completion ever arrives.
    Silent,
}

/// Scripted answers of the mock stack.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub connect: ConnectReply,
    pub reject_listen: bool,
    pub reject_connect_response: bool,
    /// Refuse link configuration.
    pub reject_link: bool,
    /// Post `DataTransmitted` after each data request.
    pub auto_transmit: bool,
    /// Post `HangupTerminated` after each disconnect request.
    pub auto_hangup: bool,
    /// Parameters reported in `Connected`.
    pub remote: SessionParams,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            connect: ConnectReply::Establish,
            reject_listen: false,
            reject_connect_response: false,
            reject_link: false,
            auto_transmit: true,
            auto_hangup: true,
            remote: SessionParams {
                miu: 248,
                rw: 2,
                local_sap: 0x20,
            },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    behavior: MockBehavior,
    next_handle: u64,
    calls: Vec<Call>,
    connections: HashMap<ConnectionHandle, SocketId>,
    servers: HashMap<ServerHandle, SocketId>,
}

impl MockState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Recording lower stack whose completions go to the hardware thread.
#[derive(Debug)]
pub struct MockStack {
    state: Mutex<MockState>,
    events: Sender<StackEvent>,
}

impl MockStack {
    fn new(behavior: MockBehavior, events: Sender<StackEvent>) -> Self {
        Self {
            state: Mutex::new(MockState {
                behavior,
                next_handle: 0x100,
                ..MockState::default()
            }),
            events,
        }
    }

    fn emit(&self, event: StackEvent) {
        let _ = self.events.send(event);
    }

    /// Every request seen so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// How many requests matched `filter`.
    pub fn count(&self, filter: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| filter(call)).count()
    }

    /// Changes the scripted answers.
    pub fn configure(&self, update: impl FnOnce(&mut MockBehavior)) {
        update(&mut self.state.lock().behavior);
    }

    /// Connection handle issued for `socket`, if any.
    pub fn connection_of(&self, socket: SocketId) -> Option<ConnectionHandle> {
        self.state
            .lock()
            .connections
            .iter()
            .find_map(|(handle, owner)| (*owner == socket).then_some(*handle))
    }
}

impl LowerStack for MockStack {
    fn configure_link(&self, link: &LlcpLinkConfig) -> Result<(), StackError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ConfigureLink(*link));
        if state.behavior.reject_link {
            return Err(StackError::InvalidParameter("link"));
        }
        Ok(())
    }

    fn connect_request(
        &self,
        context: SocketId,
        request: &ConnectRequest,
    ) -> Result<ConnectionHandle, StackError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Connect {
            context,
            request: request.clone(),
        });
        let reply = state.behavior.connect;
        if let ConnectReply::Reject(status) = reply {
            return Err(StackError::Rejected(status));
        }
        let handle = ConnectionHandle::new(state.next_handle());
        state.connections.insert(handle, context);
        let params = state.behavior.remote;
        drop(state);

        match reply {
            ConnectReply::Establish => self.emit(StackEvent::Connected { context, params }),
            ConnectReply::Fail(reason) => self.emit(StackEvent::ConnectFailed { context, reason }),
            ConnectReply::Reject(_) | ConnectReply::Silent => {}
        }
        Ok(handle)
    }

    fn listen_request(
        &self,
        context: SocketId,
        request: &ListenRequest,
    ) -> Result<ServerHandle, StackError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Listen {
            context,
            request: request.clone(),
        });
        if state.behavior.reject_listen {
            return Err(StackError::InsufficientResources);
        }
        let handle = ServerHandle::new(state.next_handle());
        state.servers.insert(handle, context);
        Ok(handle)
    }

    fn connect_response(
        &self,
        connection: ConnectionHandle,
        context: SocketId,
    ) -> Result<(), StackError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ConnectResponse {
            connection,
            context,
        });
        if state.behavior.reject_connect_response {
            return Err(StackError::Rejected(0x02));
        }
        state.connections.insert(connection, context);
        Ok(())
    }

    fn disconnect_request(&self, link: LinkHandle) -> Result<(), StackError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Disconnect(link));
        let context = match link {
            LinkHandle::Connection(handle) => state.connections.get(&handle).copied(),
            LinkHandle::Server(handle) => state.servers.get(&handle).copied(),
        };
        let hangup = state.behavior.auto_hangup;
        drop(state);

        if let (true, Some(context)) = (hangup, context) {
            self.emit(StackEvent::HangupTerminated { context });
        }
        Ok(())
    }

    fn data_request(&self, connection: ConnectionHandle, data: &[u8]) -> Result<(), StackError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Data {
            connection,
            data: data.to_vec(),
        });
        let context = state.connections.get(&connection).copied();
        let transmit = state.behavior.auto_transmit;
        drop(state);

        if let (true, Some(context)) = (transmit, context) {
            self.emit(StackEvent::DataTransmitted { context });
        }
        Ok(())
    }

    fn data_response(&self, connection: ConnectionHandle) {
        self.state.lock().calls.push(Call::DataResponse(connection));
    }
}

/// Sink that remembers every notification.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) {
        self.seen.lock().push(notification.clone());
    }
}

/// Configuration used by the harness: no connect delay.
pub fn test_config() -> ServiceConfig {
    ServiceProfile::Testing.to_config()
}

/// Builds the mock stack and its event channel.
pub fn mock_stack(behavior: MockBehavior) -> (MockStack, Sender<StackEvent>, Receiver<StackEvent>) {
    let (tx, rx) = mpsc::channel();
    (MockStack::new(behavior, tx.clone()), tx, rx)
}

/// Starts the thread delivering stack events to `service`.
///
/// It holds the service weakly and exits once every sender is gone.
pub fn spawn_hardware(service: &Arc<NfcService<MockStack>>, events: Receiver<StackEvent>) {
    let service: Weak<NfcService<MockStack>> = Arc::downgrade(service);
    thread::Builder::new()
        .name("hardware".to_string())
        .spawn(move || {
            while let Ok(event) = events.recv() {
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.handle_stack_event(event);
            }
        })
        .expect("spawn hardware thread");
}

/// A running service wired to a mock stack and a recording sink.
pub struct Harness {
    pub service: Arc<NfcService<MockStack>>,
    pub sink: Arc<RecordingSink>,
    injector: Sender<StackEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let (stack, injector, events) = mock_stack(behavior);
        let sink = Arc::new(RecordingSink::default());
        let service = Arc::new(
            NfcService::new(stack, sink.clone(), test_config()).expect("service starts"),
        );
        spawn_hardware(&service, events);
        Self {
            service,
            sink,
            injector,
        }
    }

    pub fn stack(&self) -> &MockStack {
        self.service.stack()
    }

    /// Queues `event` behind any completion already in flight.
    pub fn inject(&self, event: StackEvent) {
        self.injector.send(event).expect("hardware thread alive");
    }
}
