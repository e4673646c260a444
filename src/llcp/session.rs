//! Blocking LLCP socket operations.

use std::thread;

use super::socket::{
    AcceptOptions, Accepted, LinkParams, ListenOptions, LlcpSocket, SessionState, SocketOptions,
    receive_buffer_len,
};
use crate::error::{Error, ErrorKind, Result};
use crate::ring_buffer::RingBuffer;
use crate::service::NfcService;
use crate::stack::{
    ConnectRequest, ConnectTarget, ListenRequest, LowerStack, MAX_LISTEN_SERVICE_NAME,
    truncate_service_name,
};
use crate::sync::{SuspendOutcome, WaitEvents};
use crate::tracing_compat::{debug, warn};
use crate::util::SocketId;

impl<S: LowerStack> NfcService<S> {
    /// Creates a client socket with a receive buffer sized for its window.
    pub fn create_socket(&self, options: SocketOptions) -> Result<SocketId> {
        let mut rx = RingBuffer::new();
        let capacity = receive_buffer_len(options.miu, options.rw, options.linear_buffer_len);
        if !rx.allocate(capacity) {
            return Err(Error::new(ErrorKind::InsufficientResources)
                .with_message(format!("receive buffer of {capacity} bytes")));
        }
        let local = LinkParams {
            miu: options.miu,
            rw: options.rw,
            sap: options.sap,
        };
        let mut list = self.sockets.lock();
        self.ensure_running()?;
        let id = list.add(LlcpSocket::client(local, rx));
        drop(list);
        debug!(socket = ?id, sap = options.sap, miu = options.miu, rw = options.rw, "client socket created");
        Ok(id)
    }

    /// Creates a listening socket and registers it with the lower stack.
    ///
    /// A service name takes precedence over the SAP, which is then sent as 0.
    pub fn create_service_socket(&self, options: ListenOptions) -> Result<SocketId> {
        let service_name = options
            .service_name
            .map(|name| truncate_service_name(name, MAX_LISTEN_SERVICE_NAME));
        let sap = if service_name.is_some() { 0 } else { options.sap };
        let request = ListenRequest {
            sap,
            service_name,
            miu: options.miu,
            rw: options.rw,
        };
        let local = LinkParams {
            miu: options.miu,
            rw: options.rw,
            sap,
        };

        let mut list = self.sockets.lock();
        self.ensure_running()?;
        let id = list.add(LlcpSocket::service(local));
        let registered = list.own(id).map(|mut node| {
            let result = {
                let _hardware = self.hardware_lock.lock();
                self.stack.listen_request(id, &request)
            };
            if let Ok(server) = &result {
                let record = node.get_mut();
                record.server = Some(*server);
                record.state = SessionState::Listening;
            }
            result
        });

        match registered {
            Some(Ok(server)) => {
                debug!(socket = ?id, server = server.raw(), sap, name = ?request.service_name, "service socket listening");
                Ok(id)
            }
            Some(Err(err)) => {
                warn!(socket = ?id, error = %err, "listen request rejected");
                list.remove(id);
                Err(Error::new(ErrorKind::SocketCreation)
                    .with_message("listen request rejected")
                    .with_source(err))
            }
            None => {
                list.remove(id);
                Err(Error::internal("new service socket refused ownership"))
            }
        }
    }

    /// Connects a client socket and blocks until the session is up.
    pub fn connect(&self, socket: SocketId, target: ConnectTarget) -> Result<()> {
        let delay = self.config.timeouts.connect_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut list = self.sockets.lock();
        self.ensure_running()?;
        let Some(mut node) = list.own(socket) else {
            debug!(socket = ?socket, "connect on a socket being torn down");
            return Err(Error::socket_closed(socket));
        };

        let request = {
            let record = node.get_mut();
            record.state = SessionState::Connecting;
            ConnectRequest {
                target: target.bounded(),
                miu: record.local.miu,
                rw: record.local.rw,
            }
        };
        debug!(socket = ?socket, target = ?request.target, "connect requested");

        match self.stack.connect_request(socket, &request) {
            Ok(connection) => node.get_mut().connection = Some(connection),
            Err(err) => {
                warn!(socket = ?socket, error = %err, "connect request rejected");
                node.get_mut().state = SessionState::Created;
                return Err(Error::from(err)
                    .with_socket(socket)
                    .with_message("connect request rejected"));
            }
        }

        match node.suspend(WaitEvents::CONNECT | WaitEvents::CONNECT_FAILED) {
            SuspendOutcome::Interrupted => {
                node.get_mut().connection = None;
                debug!(socket = ?socket, "connect interrupted");
                Err(Error::interrupted(socket))
            }
            SuspendOutcome::Woken(events) if events.contains(WaitEvents::CONNECT_FAILED) => {
                node.clear(WaitEvents::CONNECT | WaitEvents::CONNECT_FAILED);
                let record = node.get_mut();
                record.connection = None;
                record.state = SessionState::Created;
                debug!(socket = ?socket, "connect failed");
                Err(Error::new(ErrorKind::ConnectFailed).with_socket(socket))
            }
            SuspendOutcome::Woken(_) => {
                node.clear(WaitEvents::CONNECT);
                node.get_mut().state = SessionState::Established;
                debug!(socket = ?socket, "connected");
                Ok(())
            }
        }
    }

    /// Waits for an incoming session on a listening socket.
    ///
    /// If the listener is closed or torn down while waiting, a handle-less
    /// [`Accepted::Dummy`] socket is returned instead of an error. The CLOSE
    /// bit is left set for any other waiter. Once the service is shutting
    /// down no dummy is created and the call fails with `SocketClosed`.
    pub fn accept(&self, server: SocketId, options: AcceptOptions) -> Result<Accepted> {
        let mut rx = RingBuffer::new();
        let capacity = receive_buffer_len(options.miu, options.rw, options.linear_buffer_len);
        if !rx.allocate(capacity) {
            warn!(socket = ?server, capacity, "no receive buffer for accepted socket");
            return Err(Error::new(ErrorKind::InsufficientResources)
                .with_socket(server)
                .with_message(format!("receive buffer of {capacity} bytes")));
        }

        let mut list = self.sockets.lock();
        self.ensure_running()?;
        let Some(mut node) = list.own(server) else {
            debug!(socket = ?server, "accept on a socket being torn down");
            return Err(Error::socket_closed(server));
        };

        let pending = match node.suspend(WaitEvents::CONNECT | WaitEvents::CLOSE) {
            SuspendOutcome::Woken(events) if events.contains(WaitEvents::CONNECT) => {
                node.clear(WaitEvents::CONNECT);
                let record = node.get_mut();
                record
                    .connection
                    .take()
                    .map(|connection| (connection, record.remote, record.local.sap))
            }
            SuspendOutcome::Woken(_) => {
                debug!(socket = ?server, "listener closing; accept yields a dummy socket");
                None
            }
            SuspendOutcome::Interrupted => {
                debug!(socket = ?server, "accept interrupted; yielding a dummy socket");
                None
            }
        };

        let Some((connection, remote, local_sap)) = pending else {
            if !self.is_running() {
                debug!(socket = ?server, "service shutting down; no dummy socket");
                return Err(Error::socket_closed(server).with_message("service shut down"));
            }
            let local = LinkParams {
                miu: options.miu,
                rw: options.rw,
                sap: node.get().local.sap,
            };
            let dummy = node.list().add(LlcpSocket::client(local, rx));
            return Ok(Accepted::Dummy(dummy));
        };

        let local = LinkParams {
            miu: options.miu,
            rw: options.rw,
            sap: local_sap,
        };
        let child = node
            .list()
            .add(LlcpSocket::accepted(connection, local, remote, rx));

        if let Err(err) = self.stack.connect_response(connection, child) {
            warn!(socket = ?server, child = ?child, error = %err, "connect response rejected");
            node.list().remove(child);
            return Err(Error::from(err)
                .with_socket(server)
                .with_message("connect response rejected"));
        }

        debug!(
            socket = ?server,
            child = ?child,
            remote_sap = remote.sap,
            remote_miu = remote.miu,
            "session accepted"
        );
        Ok(Accepted::Connected(child))
    }

    /// Sends `data` and blocks until the lower stack reports it transmitted.
    pub fn send(&self, socket: SocketId, data: &[u8]) -> Result<()> {
        let mut list = self.sockets.lock();
        let Some(mut node) = list.own(socket) else {
            debug!(socket = ?socket, "send on a socket being torn down");
            return Err(Error::socket_closed(socket));
        };
        self.ensure_running()?;
        let Some(connection) = node.get().connection else {
            return Err(Error::not_connected(socket));
        };

        self.stack.data_request(connection, data).map_err(|err| {
            warn!(socket = ?socket, error = %err, "data request rejected");
            Error::from(err)
                .with_socket(socket)
                .with_message("data request rejected")
        })?;

        match node.suspend(WaitEvents::WRITE | WaitEvents::CLOSE) {
            SuspendOutcome::Woken(events) if events.contains(WaitEvents::WRITE) => {
                node.clear(WaitEvents::WRITE);
                Ok(())
            }
            SuspendOutcome::Woken(_) => Err(Error::new(ErrorKind::ConnectionClosed)
                .with_socket(socket)
                .with_message("closed during send")),
            SuspendOutcome::Interrupted => Err(Error::interrupted(socket)),
        }
    }

    /// Reads up to `buf.len()` bytes, blocking while nothing is buffered.
    ///
    /// Returns `Ok(0)` once the session has closed with nothing left to
    /// read, or when the socket is torn down while waiting. Data that arrived
    /// together with the close is still delivered. A socket that never had a
    /// connection (a dummy) fails with `NotConnected`.
    pub fn receive(&self, socket: SocketId, buf: &mut [u8]) -> Result<usize> {
        let mut list = self.sockets.lock();
        let Some(mut node) = list.own(socket) else {
            debug!(socket = ?socket, "receive on a socket being torn down");
            return Err(Error::socket_closed(socket));
        };
        if buf.is_empty() {
            return Ok(0);
        }

        if !node.get().rx.is_empty() {
            let read = node.get_mut().rx.read_available(buf);
            if node.get().rx.is_empty() {
                node.clear(WaitEvents::READ);
            }
            return Ok(read);
        }
        if node.get().connection.is_none() {
            if node.events().contains(WaitEvents::CLOSE) {
                return Ok(0);
            }
            return Err(Error::not_connected(socket));
        }

        loop {
            match node.suspend(WaitEvents::READ | WaitEvents::CLOSE) {
                SuspendOutcome::Interrupted => {
                    node.get_mut().rx.clear();
                    debug!(socket = ?socket, "receive interrupted");
                    return Ok(0);
                }
                SuspendOutcome::Woken(events) => {
                    if events.contains(WaitEvents::READ) {
                        node.clear(WaitEvents::READ);
                    } else {
                        node.get_mut().rx.clear();
                    }
                    let read = node.get_mut().rx.read_available(buf);
                    if read > 0 || events.contains(WaitEvents::CLOSE) {
                        return Ok(read);
                    }
                }
            }
        }
    }

    /// Closes a socket: disconnects it, ejects every waiter, then frees it.
    ///
    /// Closing a socket that is already gone succeeds.
    pub fn close(&self, socket: SocketId) -> Result<()> {
        let _close = self.sockets.lock_close();
        let mut list = self.sockets.lock();
        {
            let Some(mut node) = list.own(socket) else {
                debug!(socket = ?socket, "close of a socket already torn down");
                return Ok(());
            };
            let link = {
                let record = node.get_mut();
                record.state = SessionState::Closing;
                record.link_handle()
            };
            if let Some(link) = link {
                match self.stack.disconnect_request(link) {
                    Ok(()) => {
                        let outcome = node.suspend(WaitEvents::CLOSE);
                        debug!(socket = ?socket, ?outcome, "disconnect completed");
                    }
                    Err(err) => warn!(socket = ?socket, error = %err, "disconnect request rejected"),
                }
            }
        }
        list.interrupt(socket);
        if list.exists(socket) && list.remove(socket).is_some() {
            debug!(socket = ?socket, sockets = list.len(), "socket closed");
        }
        Ok(())
    }

    /// Remote MIU negotiated for the session.
    pub fn remote_miu(&self, socket: SocketId) -> Result<u16> {
        self.inspect(socket, |record| record.remote.miu)
    }

    /// Remote receive window negotiated for the session.
    pub fn remote_rw(&self, socket: SocketId) -> Result<u8> {
        self.inspect(socket, |record| record.remote.rw)
    }

    /// Local SAP the socket is bound to.
    pub fn local_sap(&self, socket: SocketId) -> Result<u8> {
        self.inspect(socket, |record| record.local.sap)
    }

    /// Lifecycle state of the socket.
    pub fn session_state(&self, socket: SocketId) -> Result<SessionState> {
        self.inspect(socket, LlcpSocket::state)
    }

    fn inspect<R>(&self, socket: SocketId, read: impl FnOnce(&LlcpSocket) -> R) -> Result<R> {
        let mut list = self.sockets.lock();
        let node = list
            .own(socket)
            .ok_or_else(|| Error::socket_closed(socket))?;
        Ok(read(node.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use std::result::Result;

    use crate::config::{LlcpLinkConfig, ServiceProfile};
    use crate::notify::{Notification, NotificationSink};
    use crate::stack::{ConnectionHandle, LinkHandle, ServerHandle, StackError};
    use crate::test_utils::init_test_logging;

    /// Accepts every request and never completes anything.
    struct IdleStack;

    impl LowerStack for IdleStack {
        fn configure_link(&self, _link: &LlcpLinkConfig) -> Result<(), StackError> {
            Ok(())
        }

        fn connect_request(
            &self,
            _context: SocketId,
            _request: &ConnectRequest,
        ) -> Result<ConnectionHandle, StackError> {
            Ok(ConnectionHandle::new(1))
        }

        fn listen_request(
            &self,
            _context: SocketId,
            _request: &ListenRequest,
        ) -> Result<ServerHandle, StackError> {
            Ok(ServerHandle::new(2))
        }

        fn connect_response(
            &self,
            _connection: ConnectionHandle,
            _context: SocketId,
        ) -> Result<(), StackError> {
            Ok(())
        }

        fn disconnect_request(&self, _link: LinkHandle) -> Result<(), StackError> {
            Ok(())
        }

        fn data_request(&self, _connection: ConnectionHandle, _data: &[u8]) -> Result<(), StackError> {
            Ok(())
        }

        fn data_response(&self, _connection: ConnectionHandle) {}
    }

    struct NullSink;

    impl NotificationSink for NullSink {
        fn notify(&self, _notification: &Notification) {}
    }

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn idle_service() -> Arc<NfcService<IdleStack>> {
        Arc::new(
            NfcService::new(IdleStack, Arc::new(NullSink), ServiceProfile::Testing.to_config())
                .expect("service starts"),
        )
    }

    fn wait_for_owners(service: &NfcService<IdleStack>, socket: SocketId, owners: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let state = service.sockets.lock().state(socket);
            if state.is_some_and(|state| state.owners() == owners) {
                return;
            }
            assert!(Instant::now() < deadline, "owner count never reached {owners}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn receive_delivers_data_posted_with_close_in_one_wake() {
        init_test("receive_delivers_data_posted_with_close_in_one_wake");
        let service = idle_service();
        let mut rx = RingBuffer::new();
        assert!(rx.allocate(256));
        let local = LinkParams {
            miu: 128,
            rw: 1,
            sap: 0x20,
        };
        let remote = LinkParams {
            miu: 248,
            rw: 2,
            sap: 0x04,
        };
        let socket = service.sockets.lock().add(LlcpSocket::accepted(
            ConnectionHandle::new(0x10),
            local,
            remote,
            rx,
        ));

        let reader = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                let first = service.receive(socket, &mut buf).unwrap();
                let data = buf[..first].to_vec();
                let second = service.receive(socket, &mut buf).unwrap();
                (data, second)
            })
        };
        // The reader keeps the lock from `own` until it parks.
        wait_for_owners(&service, socket, 1);

        let payload: Vec<u8> = (1..=10).collect();
        {
            let mut list = service.sockets.lock();
            let record = list.get_mut(socket).expect("socket present");
            assert!(record.rx.write(&payload));
            assert!(list.post_event(socket, WaitEvents::READ | WaitEvents::CLOSE));
        }

        let (data, second) = reader.join().unwrap();
        crate::assert_with_log!(data == payload, "bytes delivered with close", payload, data);
        crate::assert_with_log!(second == 0, "end of stream after drain", 0, second);
        crate::test_complete!("receive_delivers_data_posted_with_close_in_one_wake");
    }

    #[test]
    fn accept_keeps_pending_session_when_buffer_allocation_fails() {
        init_test("accept_keeps_pending_session_when_buffer_allocation_fails");
        let service = idle_service();
        let connection = ConnectionHandle::new(0x42);
        let server = {
            let mut list = service.sockets.lock();
            let mut listener = LlcpSocket::service(LinkParams {
                miu: 128,
                rw: 1,
                sap: 0x10,
            });
            listener.server = Some(ServerHandle::new(0x41));
            listener.state = SessionState::Listening;
            listener.connection = Some(connection);
            let id = list.add(listener);
            assert!(list.post_event(id, WaitEvents::CONNECT));
            id
        };

        let oversized = AcceptOptions {
            miu: 128,
            rw: 1,
            linear_buffer_len: usize::MAX / 2,
        };
        let err = service.accept(server, oversized).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientResources);
        {
            let list = service.sockets.lock();
            let record = list.get(server).expect("listener present");
            assert_eq!(record.connection(), Some(connection));
            assert!(list.pending_events(server).contains(WaitEvents::CONNECT));
            assert_eq!(list.len(), 1);
        }

        crate::test_section!("retry with a sane buffer");
        let accepted = service.accept(server, AcceptOptions::new(128, 1)).unwrap();
        let Accepted::Connected(child) = accepted else {
            panic!("expected a connected socket, got {accepted:?}");
        };
        assert_eq!(service.session_state(child).unwrap(), SessionState::Established);
        assert_eq!(service.sockets.lock().get(child).unwrap().connection(), Some(connection));
        crate::test_complete!("accept_keeps_pending_session_when_buffer_allocation_fails");
    }
}
