//! LLCP connection-oriented sockets.
//!
//! - [`socket`]: the per-socket record kept in the socket list
//! - `session`: the blocking operations callers invoke on
//!   [`NfcService`](crate::NfcService) (create, connect, accept, send,
//!   receive, close)
//! - `events`: the adapter that turns lower-stack callbacks into event bits
//!
//! All operations follow one discipline: take the list lock, own the node,
//! do the work, park with [`suspend`](crate::sync::ListGuard::suspend) if the
//! lower stack has to answer, and let the node guard release ownership on
//! every exit path.

mod events;
mod session;
pub mod socket;

pub use crate::stack::ConnectTarget;
pub use socket::{
    AcceptOptions, Accepted, LinkParams, ListenOptions, LlcpSocket, SessionState, SocketOptions,
    SocketRole,
};
