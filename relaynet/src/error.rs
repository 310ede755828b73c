use std::fmt;
use std::io;
use std::net::AddrParseError;

/// A single error hierarchy covering every reportable failure in the
/// transport, from programmer errors (invalid arguments, misuse of the
/// endpoint state machine) through to asynchronous network events
/// (timeouts, resets).
#[derive(Debug)]
pub enum TransportError {
    /// An invalid port number or malformed address was supplied.
    Argument(String),
    /// The operation is invalid for the endpoint's current state
    /// (e.g. `connect` while already connecting, `send` while disconnected).
    Client(String),
    /// The operation is invalid for a peer's current state
    /// (e.g. sending to a peer that is disconnecting).
    Server(String),
    /// A buffer underflow, or a message that would exceed the MTU.
    Buffer(BufferError),
    /// A registry or codec violation: unknown type id, duplicate
    /// registration, or a field value violating its wire constraint.
    Message(String),
    /// The underlying socket reported a fatal condition.
    NetworkEndpoint(io::ErrorKind),
    /// No datagram has been received from the peer within `timeout`.
    TimedOut,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum BufferError {
    Underflow { attempted: usize, remaining: usize },
    ExceedsMtu { size: usize, mtu: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Argument(msg) => write!(f, "argument error: {msg}"),
            TransportError::Client(msg) => write!(f, "client error: {msg}"),
            TransportError::Server(msg) => write!(f, "server error: {msg}"),
            TransportError::Buffer(err) => write!(f, "buffer error: {err}"),
            TransportError::Message(msg) => write!(f, "message error: {msg}"),
            TransportError::NetworkEndpoint(kind) => write!(f, "network endpoint error: {kind}"),
            TransportError::TimedOut => write!(f, "connection timed out"),
        }
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Underflow { attempted, remaining } => write!(
                f,
                "buffer underflow: attempted to read {attempted} bytes, {remaining} remaining"
            ),
            BufferError::ExceedsMtu { size, mtu } => {
                write!(f, "message of {size} bytes exceeds mtu of {mtu} bytes")
            }
        }
    }
}

impl std::error::Error for TransportError {}
impl std::error::Error for BufferError {}

impl From<BufferError> for TransportError {
    #[inline]
    fn from(err: BufferError) -> Self {
        TransportError::Buffer(err)
    }
}

impl From<io::Error> for TransportError {
    #[inline]
    fn from(err: io::Error) -> Self {
        TransportError::NetworkEndpoint(err.kind())
    }
}

impl From<AddrParseError> for TransportError {
    #[inline]
    fn from(_: AddrParseError) -> Self {
        TransportError::Argument("malformed socket address".into())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
