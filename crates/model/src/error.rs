use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited or overloaded.
    RateLimitExceeded,
    /// The provider rejected the request as malformed.
    InvalidRequest,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if a request failed with this kind may succeed
    /// when sent again later.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => write!(f, "Moderated"),
            ErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            ErrorKind::InvalidRequest => write!(f, "Invalid request"),
            ErrorKind::Other => write!(f, "Other"),
        }
    }
}
