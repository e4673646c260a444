//! Error types for the NFC bridge core.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed; every failure carries an [`ErrorKind`]
//! - A socket that is being torn down is an ordinary outcome, not a fault
//! - Lower-stack failures keep their original cause as the error source
//! - Every kind maps onto the negative status codes used at the platform
//!   boundary (see [`codes`])
//!
//! # Error Categories
//!
//! - **Teardown**: the target socket is gone or is being closed
//! - **Session**: the LLCP session did not reach or left the connected state
//! - **Stack**: the lower stack rejected a request
//! - **Resource**: buffer allocation failed
//! - **Lifecycle**: service initialize/deinitialize ordering
//! - **Internal**: configuration problems and invariant violations

use core::fmt;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::stack::StackError;
use crate::util::SocketId;

/// Negative status codes reported across the platform boundary.
pub mod codes {
    /// Generic I/O failure.
    pub const ERROR_IO: i32 = -1;
    /// Operation cancelled by teardown.
    pub const ERROR_CANCELLED: i32 = -2;
    /// Operation timed out.
    pub const ERROR_TIMEOUT: i32 = -3;
    /// Resource busy.
    pub const ERROR_BUSY: i32 = -4;
    /// Connection could not be established.
    pub const ERROR_CONNECT: i32 = -5;
    /// Connection was torn down.
    pub const ERROR_DISCONNECT: i32 = -5;
    /// Read failure.
    pub const ERROR_READ: i32 = -6;
    /// Write failure.
    pub const ERROR_WRITE: i32 = -7;
    /// Invalid parameter.
    pub const ERROR_INVALID_PARAM: i32 = -8;
    /// Allocation failure.
    pub const ERROR_INSUFFICIENT_RESOURCES: i32 = -9;
    /// The lower stack refused to create the socket.
    pub const ERROR_SOCKET_CREATION: i32 = -10;
    /// Socket has no connection.
    pub const ERROR_SOCKET_NOT_CONNECTED: i32 = -11;
    /// Caller buffer too small.
    pub const ERROR_BUFFER_TOO_SMALL: i32 = -12;
    /// Service access point already in use.
    pub const ERROR_SAP_USED: i32 = -13;
    /// Service name already in use.
    pub const ERROR_SERVICE_NAME_USED: i32 = -14;
    /// Invalid socket options.
    pub const ERROR_SOCKET_OPTIONS: i32 = -15;
    /// Operation not allowed while NFC is on.
    pub const ERROR_NFC_ON: i32 = -16;
    /// Service not initialized.
    pub const ERROR_NOT_INITIALIZED: i32 = -17;
    /// Operation not supported.
    pub const ERROR_NOT_SUPPORTED: i32 = -21;
}

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Teardown ===
    /// The socket no longer exists or its ownership was denied.
    SocketClosed,
    /// A blocked operation was released because the socket was interrupted.
    Interrupted,

    // === Session ===
    /// The socket has no connection (dummy socket or remote disconnect).
    NotConnected,
    /// A CLOSE event ended the operation.
    ConnectionClosed,
    /// The remote side refused or the link failed during connect.
    ConnectFailed,

    // === Stack ===
    /// The lower stack rejected a request.
    StackRejected,
    /// The lower stack refused to register a listening socket.
    SocketCreation,

    // === Resource ===
    /// A receive buffer could not be allocated.
    InsufficientResources,

    // === Lifecycle ===
    /// No service is initialized.
    NotInitialized,
    /// A service is already initialized.
    AlreadyInitialized,

    // === Internal ===
    /// Configuration error (bad file, env var or override).
    ConfigError,
    /// Invariant violation inside the core.
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::SocketClosed | Self::Interrupted => ErrorCategory::Teardown,
            Self::NotConnected | Self::ConnectionClosed | Self::ConnectFailed => {
                ErrorCategory::Session
            }
            Self::StackRejected | Self::SocketCreation => ErrorCategory::Stack,
            Self::InsufficientResources => ErrorCategory::Resource,
            Self::NotInitialized | Self::AlreadyInitialized => ErrorCategory::Lifecycle,
            Self::ConfigError | Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::ConnectFailed | Self::StackRejected | Self::InsufficientResources => {
                Recoverability::Transient
            }
            Self::SocketClosed
            | Self::Interrupted
            | Self::NotConnected
            | Self::ConnectionClosed
            | Self::AlreadyInitialized
            | Self::ConfigError
            | Self::Internal => Recoverability::Permanent,
            Self::SocketCreation | Self::NotInitialized => Recoverability::Unknown,
        }
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.recoverability().should_retry()
    }

    /// Returns true for outcomes caused by socket teardown.
    ///
    /// These are expected under concurrent close and are never faults.
    #[must_use]
    pub const fn is_teardown(&self) -> bool {
        matches!(self.category(), ErrorCategory::Teardown)
    }

    /// Negative status code reported at the platform boundary.
    #[must_use]
    pub const fn platform_code(&self) -> i32 {
        match self {
            Self::SocketClosed | Self::StackRejected | Self::Internal => codes::ERROR_IO,
            Self::Interrupted => codes::ERROR_CANCELLED,
            Self::NotConnected => codes::ERROR_SOCKET_NOT_CONNECTED,
            Self::ConnectionClosed => codes::ERROR_DISCONNECT,
            Self::ConnectFailed => codes::ERROR_CONNECT,
            Self::SocketCreation => codes::ERROR_SOCKET_CREATION,
            Self::InsufficientResources => codes::ERROR_INSUFFICIENT_RESOURCES,
            Self::NotInitialized => codes::ERROR_NOT_INITIALIZED,
            Self::AlreadyInitialized => codes::ERROR_BUSY,
            Self::ConfigError => codes::ERROR_INVALID_PARAM,
        }
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Depends on context the error kind does not carry.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket gone or being torn down.
    Teardown,
    /// LLCP session failures.
    Session,
    /// Lower-stack rejections.
    Stack,
    /// Allocation failures.
    Resource,
    /// Service lifecycle ordering.
    Lifecycle,
    /// Configuration and invariant violations.
    Internal,
}

/// The main error type for bridge operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    socket: Option<SocketId>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            socket: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Records the socket the failing operation targeted.
    #[must_use]
    pub fn with_socket(mut self, socket: SocketId) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// The socket is gone or refused new owners.
    #[must_use]
    pub fn socket_closed(socket: SocketId) -> Self {
        Self::new(ErrorKind::SocketClosed).with_socket(socket)
    }

    /// A blocked wait was released by teardown.
    #[must_use]
    pub fn interrupted(socket: SocketId) -> Self {
        Self::new(ErrorKind::Interrupted).with_socket(socket)
    }

    /// The socket has no connection handle.
    #[must_use]
    pub fn not_connected(socket: SocketId) -> Self {
        Self::new(ErrorKind::NotConnected).with_socket(socket)
    }

    /// The service was shut down.
    #[must_use]
    pub fn shut_down() -> Self {
        Self::new(ErrorKind::NotInitialized).with_message("service shut down")
    }

    /// Invariant violation.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns true if the target socket was torn down.
    #[must_use]
    pub const fn is_teardown(&self) -> bool {
        self.kind.is_teardown()
    }

    /// Negative status code for the platform boundary.
    #[must_use]
    pub const fn platform_code(&self) -> i32 {
        self.kind.platform_code()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the socket the operation targeted, if recorded.
    #[must_use]
    pub const fn socket(&self) -> Option<SocketId> {
        self.socket
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(socket) = self.socket {
            write!(f, " [{socket:?}]")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<StackError> for Error {
    fn from(err: StackError) -> Self {
        Self::new(ErrorKind::StackRejected).with_source(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::ConfigError)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for bridge operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_socket_and_message() {
        let err = Error::socket_closed(SocketId::new(3, 1)).with_message("send");
        assert_eq!(err.to_string(), "SocketClosed [SocketId(3:1)]: send");
    }

    #[test]
    fn stack_error_keeps_source() {
        let err: Error = StackError::Rejected(0x0021).into();
        assert_eq!(err.kind(), ErrorKind::StackRejected);
        let source = err.source().expect("source missing");
        assert!(source.to_string().contains("0x0021"));
    }

    #[test]
    fn config_error_converts() {
        let err: Error = ConfigError::InvalidMiu(12).into();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.platform_code(), codes::ERROR_INVALID_PARAM);
    }

    #[test]
    fn result_ext_adds_message() {
        let res: core::result::Result<(), StackError> = Err(StackError::NotInitialized);
        let err = res.context("listen failed").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::StackRejected);
        assert_eq!(err.to_string(), "StackRejected: listen failed");
    }

    #[test]
    fn teardown_kinds_are_not_retryable() {
        for kind in [ErrorKind::SocketClosed, ErrorKind::Interrupted] {
            assert!(kind.is_teardown());
            assert!(!kind.is_retryable());
        }
        assert!(!ErrorKind::StackRejected.is_teardown());
        assert!(ErrorKind::ConnectFailed.is_retryable());
    }

    #[test]
    fn platform_codes_are_negative() {
        let kinds = [
            ErrorKind::SocketClosed,
            ErrorKind::Interrupted,
            ErrorKind::NotConnected,
            ErrorKind::ConnectionClosed,
            ErrorKind::ConnectFailed,
            ErrorKind::StackRejected,
            ErrorKind::SocketCreation,
            ErrorKind::InsufficientResources,
            ErrorKind::NotInitialized,
            ErrorKind::AlreadyInitialized,
            ErrorKind::ConfigError,
            ErrorKind::Internal,
        ];
        for kind in kinds {
            assert!(kind.platform_code() < 0, "{kind:?}");
        }
        assert_eq!(
            ErrorKind::NotConnected.platform_code(),
            codes::ERROR_SOCKET_NOT_CONNECTED
        );
        assert_eq!(ErrorKind::Interrupted.platform_code(), codes::ERROR_CANCELLED);
    }
}
