//! Lower-stack callbacks turned into socket events.
//!
//! Each callback resolves its context id, takes ownership of the node,
//! updates the record and posts one event bit. A socket that is gone or being
//! torn down refuses ownership; the event is stale and is dropped.

use crate::llcp::socket::{LlcpSocket, SessionState, SocketRole};
use crate::service::NfcService;
use crate::stack::{IncomingSession, LowerStack, SessionParams};
use crate::sync::WaitEvents;
use crate::tracing_compat::{debug, warn};
use crate::util::SocketId;

impl<S: LowerStack> NfcService<S> {
    /// A client session came up.
    pub fn on_session_established(&self, context: SocketId, params: SessionParams) {
        self.deliver(context, "session_established", |record, _| {
            record.remote.miu = params.miu;
            record.remote.rw = params.rw;
            record.local.sap = params.local_sap;
            WaitEvents::CONNECT
        });
    }

    /// An incoming session was offered to a listening socket.
    pub fn on_session_indication(&self, context: SocketId, session: IncomingSession) {
        self.deliver(context, "session_indication", |record, _| {
            if record.role != SocketRole::Service {
                warn!(socket = ?context, "incoming session on a non-listening socket");
                return WaitEvents::NONE;
            }
            if let Some(previous) = record.connection.replace(session.connection) {
                warn!(socket = ?context, previous = previous.raw(), "unaccepted incoming session replaced");
            }
            record.remote.miu = session.miu;
            record.remote.rw = session.rw;
            record.remote.sap = session.remote_sap;
            record.local.sap = session.local_sap;
            WaitEvents::CONNECT
        });
    }

    /// Session establishment failed.
    pub fn on_session_failed(&self, context: SocketId, reason: u32) {
        self.deliver(context, "session_failed", |_, _| {
            debug!(socket = ?context, reason, "session establishment failed");
            WaitEvents::CONNECT_FAILED
        });
    }

    /// Our own hang-up finished.
    pub fn on_session_terminated(&self, context: SocketId) {
        self.deliver(context, "session_terminated", |_, _| WaitEvents::CLOSE);
    }

    /// The peer or the link dropped the session.
    pub fn on_session_disconnected(&self, context: SocketId, reason: u32) {
        self.deliver(context, "session_disconnected", |record, _| {
            debug!(socket = ?context, reason, "session disconnected");
            record.connection = None;
            if record.state == SessionState::Established {
                record.state = SessionState::Created;
            }
            WaitEvents::CLOSE
        });
    }

    /// Queued payload went out.
    pub fn on_data_transmitted(&self, context: SocketId) {
        self.deliver(context, "data_transmitted", |_, _| WaitEvents::WRITE);
    }

    /// Payload arrived. It is acknowledged even if it cannot be buffered.
    pub fn on_data_indication(&self, context: SocketId, data: &[u8]) {
        self.deliver(context, "data_indication", |record, stack| {
            if !record.rx.write(data) {
                warn!(socket = ?context, len = data.len(), "receive buffer overflow; payload dropped");
            }
            if let Some(connection) = record.connection {
                stack.data_response(connection);
            }
            WaitEvents::READ
        });
    }

    fn deliver(
        &self,
        context: SocketId,
        callback: &'static str,
        apply: impl FnOnce(&mut LlcpSocket, &S) -> WaitEvents,
    ) {
        let mut list = self.sockets.lock();
        let Some(mut node) = list.own(context) else {
            warn!(socket = ?context, callback, "dropping event for a socket being torn down");
            return;
        };
        let events = apply(node.get_mut(), &self.stack);
        if !events.is_empty() {
            node.post(events);
        }
    }
}
