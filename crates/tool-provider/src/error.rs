use std::error::Error;
use std::fmt::{self, Display};

/// The kind of error that occurred while talking to a tool provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The underlying transport could not be established or broke.
    Transport,
    /// The provider sent something that doesn't follow the protocol.
    Protocol,
    /// The provider understood the request and reported a failure.
    Server,
    /// No response arrived in time.
    Timeout,
    /// The connection has been closed.
    Closed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::Protocol => write!(f, "Protocol error"),
            ErrorKind::Server => write!(f, "Server error"),
            ErrorKind::Timeout => write!(f, "Timed out"),
            ErrorKind::Closed => write!(f, "Connection closed"),
        }
    }
}

/// The error type for a tool provider.
pub trait ToolProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}
