use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Identity provider refused the login exchange.
    AuthRejected(String),
    /// Refresh token is no longer accepted; a full login is required.
    AuthExpired(String),
    /// A data call returned 401.
    Unauthorized { body: String },
    Http { status: u16, body: String },
    Timeout,
    Transport(reqwest::Error),
    MalformedResponse(String),
    /// The coordinator is halted waiting for re-authentication.
    AuthRequired,
    InvalidZone(String),
    InvalidProgram(u8),
    InvalidPreset(String),
    Cancelled,
    Config(String),
    Io(std::io::Error),
}

impl Error {
    /// True for every outcome that needs the user to authenticate again.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::AuthRejected(_) | Error::AuthExpired(_) | Error::Unauthorized { .. } | Error::AuthRequired
        )
    }

    /// True when the same request may succeed on the next poll.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http { .. } | Error::Timeout | Error::Transport(_) | Error::MalformedResponse(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AuthRejected(msg) => write!(f, "authentication rejected: {msg}"),
            Error::AuthExpired(msg) => write!(f, "refresh token expired: {msg}"),
            Error::Unauthorized { body } => write!(f, "unauthorized (401): {body}"),
            Error::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            Error::Timeout => write!(f, "request timed out"),
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Error::AuthRequired => write!(f, "re-authentication required"),
            Error::InvalidZone(id) => write!(f, "invalid zone: {id}"),
            Error::InvalidProgram(id) => write!(f, "invalid time program: {id}"),
            Error::InvalidPreset(name) => write!(f, "invalid preset: {name}"),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_decode() {
            Error::MalformedResponse(e.to_string())
        } else {
            Error::Transport(e)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

pub type Result<T> = std::result::Result<T, Error>;
