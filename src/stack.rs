//! Contract with the lower NFC stack.
//!
//! Every request here is asynchronous: it returns as soon as the stack has
//! accepted or rejected it, and completion arrives later as a
//! [`StackEvent`] handed to
//! [`NfcService::handle_stack_event`](crate::NfcService::handle_stack_event)
//! on a stack-owned thread. A completion may arrive before, during or after
//! the initiating caller parks on the socket.
//!
//! Requests are issued while the socket list lock is held, so
//! implementations must never deliver events synchronously from inside a
//! request call.

use thiserror::Error;

use crate::config::LlcpLinkConfig;
use crate::util::SocketId;

/// Longest service name sent with a connect request, in bytes.
pub const MAX_CONNECT_SERVICE_NAME: usize = 128;

/// Longest service name registered with a listen request, in bytes.
pub const MAX_LISTEN_SERVICE_NAME: usize = 256;

/// Lower-stack handle of one data link connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Wraps a raw stack handle.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw stack handle.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Lower-stack handle of one listening service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerHandle(u64);

impl ServerHandle {
    /// Wraps a raw stack handle.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw stack handle.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// What a disconnect request tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHandle {
    /// A connected data link.
    Connection(ConnectionHandle),
    /// A listening service.
    Server(ServerHandle),
}

/// Failures reported synchronously by the lower stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The stack refused the request with a vendor status.
    #[error("request rejected with status {0:#06x}")]
    Rejected(u32),
    /// The stack is not running.
    #[error("lower stack not initialized")]
    NotInitialized,
    /// A parameter was out of range for the stack.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// The stack ran out of link resources.
    #[error("insufficient link resources")]
    InsufficientResources,
}

/// Where a connect request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A remote service access point.
    Sap(u8),
    /// A remote service name, resolved by the peer's service discovery.
    ServiceName(String),
}

impl ConnectTarget {
    /// The target with an over-long service name cut to the connect limit.
    #[must_use]
    pub fn bounded(self) -> Self {
        match self {
            Self::ServiceName(name) => {
                Self::ServiceName(truncate_service_name(name, MAX_CONNECT_SERVICE_NAME))
            }
            sap @ Self::Sap(_) => sap,
        }
    }
}

/// Parameters of a connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Remote endpoint.
    pub target: ConnectTarget,
    /// Local maximum information unit offered to the peer.
    pub miu: u16,
    /// Local receive window offered to the peer.
    pub rw: u8,
}

/// Parameters of a listen request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRequest {
    /// Local SAP; zero when the service is registered by name.
    pub sap: u8,
    /// Service name to register, if any.
    pub service_name: Option<String>,
    /// Local maximum information unit.
    pub miu: u16,
    /// Local receive window.
    pub rw: u8,
}

/// Requests the core issues to the lower stack.
///
/// The `context` passed with connect, listen and connect-response requests
/// is echoed back in the matching [`StackEvent`]s.
pub trait LowerStack: Send + Sync {
    /// Applies the local LLCP link parameters (LTO, MIU, WKS, OPT).
    fn configure_link(&self, link: &LlcpLinkConfig) -> Result<(), StackError>;

    /// Starts connecting a client socket.
    fn connect_request(
        &self,
        context: SocketId,
        request: &ConnectRequest,
    ) -> Result<ConnectionHandle, StackError>;

    /// Registers a listening service.
    fn listen_request(
        &self,
        context: SocketId,
        request: &ListenRequest,
    ) -> Result<ServerHandle, StackError>;

    /// Confirms an incoming connection, binding it to `context`.
    fn connect_response(
        &self,
        connection: ConnectionHandle,
        context: SocketId,
    ) -> Result<(), StackError>;

    /// Starts tearing down a connection or a listening service.
    fn disconnect_request(&self, link: LinkHandle) -> Result<(), StackError>;

    /// Queues payload on a connection.
    fn data_request(&self, connection: ConnectionHandle, data: &[u8]) -> Result<(), StackError>;

    /// Acknowledges inbound payload so the peer may send more.
    fn data_response(&self, connection: ConnectionHandle);
}

/// What kind of target was detected in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedKind {
    /// A peer-to-peer (LLCP) target.
    P2pTarget,
    /// A reader talking to our card-emulation endpoint.
    CardEmulation,
    /// A passive tag.
    Tag,
}

/// Parameters reported when a client session comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    /// Remote maximum information unit.
    pub miu: u16,
    /// Remote receive window.
    pub rw: u8,
    /// Local SAP the stack bound the session to.
    pub local_sap: u8,
}

/// An incoming session offered to a listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingSession {
    /// Pending connection, confirmed on accept.
    pub connection: ConnectionHandle,
    /// Remote maximum information unit.
    pub miu: u16,
    /// Remote receive window.
    pub rw: u8,
    /// Remote SAP.
    pub remote_sap: u8,
    /// Local SAP the peer addressed.
    pub local_sap: u8,
}

/// Everything the lower stack reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// A target entered the field.
    TagDetected {
        /// What was detected.
        kind: DetectedKind,
    },
    /// The target left the field.
    TagRemoved,
    /// A client session was established.
    Connected {
        /// Client socket.
        context: SocketId,
        /// Negotiated parameters.
        params: SessionParams,
    },
    /// An incoming session arrived at a listening socket.
    ConnectIndication {
        /// Listening socket.
        context: SocketId,
        /// The offered session.
        session: IncomingSession,
    },
    /// Session establishment is in progress.
    ConnectProceeding {
        /// Client socket.
        context: SocketId,
    },
    /// Session establishment failed.
    ConnectFailed {
        /// Client socket.
        context: SocketId,
        /// Vendor reason code.
        reason: u32,
    },
    /// The session was disconnected by the peer or the link.
    Disconnected {
        /// Affected socket.
        context: SocketId,
        /// Vendor reason code.
        reason: u32,
    },
    /// A hang-up completed (our own disconnect request).
    HangupTerminated {
        /// Affected socket.
        context: SocketId,
    },
    /// Queued payload was transmitted.
    DataTransmitted {
        /// Sending socket.
        context: SocketId,
    },
    /// Payload arrived.
    DataIndication {
        /// Receiving socket.
        context: SocketId,
        /// The payload.
        data: Vec<u8>,
    },
    /// An external reader issued a request (handled by the stack).
    ReaderRequest,
    /// A secure-element transaction completed.
    Transaction {
        /// Application identifier.
        aid: Vec<u8>,
        /// Transaction payload.
        data: Vec<u8>,
    },
    /// The RF field appeared or disappeared.
    FieldActivity {
        /// True when the field is on.
        on: bool,
    },
}

/// Cuts `name` to at most `limit` bytes on a char boundary.
pub(crate) fn truncate_service_name(mut name: String, limit: usize) -> String {
    if name.len() > limit {
        let mut end = limit;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}
