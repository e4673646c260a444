//! Socket records and the options used to create them.

use crate::ring_buffer::RingBuffer;
use crate::stack::{ConnectionHandle, LinkHandle, ServerHandle};
use crate::util::SocketId;

/// Per-side session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkParams {
    /// Maximum information unit.
    pub miu: u16,
    /// Receive window.
    pub rw: u8,
    /// Service access point.
    pub sap: u8,
}

/// Client or listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    /// Connects out, or was produced by accept.
    Client,
    /// Listens for incoming sessions.
    Service,
}

/// Lifecycle of a socket record. A destroyed record is simply absent from
/// the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no session.
    Created,
    /// Connect request outstanding.
    Connecting,
    /// Registered with the lower stack as a service.
    Listening,
    /// Session up; data may flow.
    Established,
    /// Teardown started.
    Closing,
}

/// Options for [`NfcService::create_socket`](crate::NfcService::create_socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Local SAP.
    pub sap: u8,
    /// Local maximum information unit.
    pub miu: u16,
    /// Local receive window.
    pub rw: u8,
    /// Extra receive-buffer bytes beyond `miu * (rw + 1)`.
    pub linear_buffer_len: usize,
}

impl SocketOptions {
    /// Options with no extra linear buffer.
    #[must_use]
    pub const fn new(sap: u8, miu: u16, rw: u8) -> Self {
        Self {
            sap,
            miu,
            rw,
            linear_buffer_len: 0,
        }
    }

    /// Sets the extra linear buffer length.
    #[must_use]
    pub const fn with_linear_buffer(mut self, len: usize) -> Self {
        self.linear_buffer_len = len;
        self
    }
}

/// Options for [`NfcService::create_service_socket`](crate::NfcService::create_service_socket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    /// Local SAP; ignored when a service name is given.
    pub sap: u8,
    /// Service name to register.
    pub service_name: Option<String>,
    /// Local maximum information unit.
    pub miu: u16,
    /// Local receive window.
    pub rw: u8,
}

/// Options for [`NfcService::accept`](crate::NfcService::accept), applied to
/// the accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptOptions {
    /// Local maximum information unit.
    pub miu: u16,
    /// Local receive window.
    pub rw: u8,
    /// Extra receive-buffer bytes beyond `miu * (rw + 1)`.
    pub linear_buffer_len: usize,
}

impl AcceptOptions {
    /// Options with no extra linear buffer.
    #[must_use]
    pub const fn new(miu: u16, rw: u8) -> Self {
        Self {
            miu,
            rw,
            linear_buffer_len: 0,
        }
    }
}

/// Result of an accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// A real session, confirmed with the lower stack.
    Connected(SocketId),
    /// A handle-less socket produced because the listener was closing.
    /// Sends and blocking receives on it fail; close it like any other.
    Dummy(SocketId),
}

impl Accepted {
    /// The new socket, real or dummy.
    #[must_use]
    pub const fn id(self) -> SocketId {
        match self {
            Self::Connected(id) | Self::Dummy(id) => id,
        }
    }

    /// True for the degraded, handle-less result.
    #[must_use]
    pub const fn is_dummy(self) -> bool {
        matches!(self, Self::Dummy(_))
    }
}

/// Receive buffer size for a socket: room for a full window plus extra.
pub(crate) fn receive_buffer_len(miu: u16, rw: u8, linear_buffer_len: usize) -> usize {
    usize::from(miu) * (usize::from(rw) + 1) + linear_buffer_len
}

/// One LLCP socket as stored in the socket list.
#[derive(Debug)]
pub struct LlcpSocket {
    pub(crate) role: SocketRole,
    pub(crate) state: SessionState,
    pub(crate) connection: Option<ConnectionHandle>,
    pub(crate) server: Option<ServerHandle>,
    pub(crate) local: LinkParams,
    pub(crate) remote: LinkParams,
    pub(crate) rx: RingBuffer,
}

impl LlcpSocket {
    pub(crate) fn client(local: LinkParams, rx: RingBuffer) -> Self {
        Self {
            role: SocketRole::Client,
            state: SessionState::Created,
            connection: None,
            server: None,
            local,
            remote: LinkParams::default(),
            rx,
        }
    }

    pub(crate) fn service(local: LinkParams) -> Self {
        Self {
            role: SocketRole::Service,
            state: SessionState::Created,
            connection: None,
            server: None,
            local,
            remote: LinkParams::default(),
            rx: RingBuffer::new(),
        }
    }

    pub(crate) fn accepted(
        connection: ConnectionHandle,
        local: LinkParams,
        remote: LinkParams,
        rx: RingBuffer,
    ) -> Self {
        Self {
            state: SessionState::Established,
            connection: Some(connection),
            remote,
            ..Self::client(local, rx)
        }
    }

    /// Client or service.
    #[must_use]
    pub const fn role(&self) -> SocketRole {
        self.role
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Connection handle, absent for dummy and disconnected sockets.
    #[must_use]
    pub const fn connection(&self) -> Option<ConnectionHandle> {
        self.connection
    }

    /// Local parameters.
    #[must_use]
    pub const fn local(&self) -> LinkParams {
        self.local
    }

    /// Remote parameters as negotiated.
    #[must_use]
    pub const fn remote(&self) -> LinkParams {
        self.remote
    }

    /// Bytes queued for the next receive.
    #[must_use]
    pub const fn buffered(&self) -> usize {
        self.rx.data_available()
    }

    /// What a disconnect request for this socket targets.
    pub(crate) fn link_handle(&self) -> Option<LinkHandle> {
        match self.role {
            SocketRole::Client => self.connection.map(LinkHandle::Connection),
            SocketRole::Service => self.server.map(LinkHandle::Server),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_buffer_covers_window() {
        assert_eq!(receive_buffer_len(128, 1, 0), 256);
        assert_eq!(receive_buffer_len(248, 3, 1024), 248 * 4 + 1024);
        assert_eq!(receive_buffer_len(0, 0, 0), 0);
    }

    #[test]
    fn link_handle_follows_role() {
        let local = LinkParams {
            miu: 128,
            rw: 1,
            sap: 0x20,
        };
        let mut client = LlcpSocket::client(local, RingBuffer::new());
        assert_eq!(client.link_handle(), None);
        client.connection = Some(ConnectionHandle::new(9));
        assert_eq!(
            client.link_handle(),
            Some(LinkHandle::Connection(ConnectionHandle::new(9)))
        );

        let mut service = LlcpSocket::service(local);
        service.connection = Some(ConnectionHandle::new(3));
        assert_eq!(service.link_handle(), None);
        service.server = Some(ServerHandle::new(1));
        assert_eq!(
            service.link_handle(),
            Some(LinkHandle::Server(ServerHandle::new(1)))
        );
    }

    #[test]
    fn accepted_record_is_established() {
        let socket = LlcpSocket::accepted(
            ConnectionHandle::new(5),
            LinkParams::default(),
            LinkParams {
                miu: 248,
                rw: 2,
                sap: 0x11,
            },
            RingBuffer::new(),
        );
        assert_eq!(socket.state(), SessionState::Established);
        assert_eq!(socket.role(), SocketRole::Client);
        assert_eq!(socket.remote().sap, 0x11);
        assert_eq!(Accepted::Dummy(SocketId::new(1, 0)).id(), SocketId::new(1, 0));
    }
}
