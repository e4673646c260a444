//! Concurrency and session core for an NFC stack bridge.
//!
//! The crate multiplexes asynchronous link events coming from a lower NFC
//! stack into a small set of native LLCP sockets. Each socket can be waited
//! on and torn down independently by caller threads while the hardware
//! callback thread keeps posting events into it.
//!
//! # Layers
//!
//! - [`sync::SocketList`]: one mutex and one broadcast condition variable
//!   guarding every socket node. Nodes carry sticky event bits, a one-way
//!   interrupt flag and a shared owner count. Interrupting a node wakes all
//!   of its waiters and blocks until they have left.
//! - [`RingBuffer`]: growable circular queue for inbound payload.
//! - [`llcp`]: the socket record, the blocking session operations
//!   (connect, accept, send, receive, close) and the callback adapter.
//! - [`notify`]: single-threaded, in-order delivery of tag, transaction and
//!   field notifications.
//! - [`service`]: the explicit service context and its init/deinit host.
//!
//! # Example
//!
//! ```ignore
//! use nfc_llcp_core::{ServiceConfig, ServiceHost, SocketOptions};
//!
//! let host = ServiceHost::new();
//! let service = host.initialize(stack, sink, ServiceConfig::default())?;
//! let socket = service.create_socket(SocketOptions::new(0x20, 128, 1))?;
//! service.connect(socket, ConnectTarget::ServiceName("urn:nfc:sn:snep".into()))?;
//! service.send(socket, b"hello")?;
//! service.close(socket)?;
//! host.deinitialize()?;
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod llcp;
pub mod notify;
pub mod ring_buffer;
pub mod service;
pub mod stack;
pub mod sync;
pub(crate) mod tracing_compat;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ConfigError, ConfigLoader, LinkProperty, LlcpLinkConfig, ServiceConfig};
pub use error::{Error, ErrorKind, Result};
pub use llcp::{
    AcceptOptions, Accepted, ConnectTarget, LinkParams, ListenOptions, SessionState, SocketOptions,
};
pub use notify::{Notification, NotificationDispatcher, NotificationSink};
pub use ring_buffer::RingBuffer;
pub use service::{NfcService, ServiceHost};
pub use stack::{LowerStack, StackError, StackEvent};
pub use sync::{SocketList, SuspendOutcome, WaitEvents};
pub use util::SocketId;
