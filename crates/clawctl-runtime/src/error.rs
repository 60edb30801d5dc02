use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Runtime-integration failures. The dispatch variants are intentionally
/// distinct: `DispatchFailed` means every mode was exhausted, while
/// `SessionIdMissing` means the command ran but its output was unusable,
/// and the two propagate differently.
#[derive(Debug)]
pub enum Error {
    Store(clawctl_store::Error),
    Io(std::io::Error),
    Config(String),

    /// The external runtime exited non-zero or printed unusable output.
    Command(String),

    /// The external runtime ran past its wall-clock budget and was
    /// killed; fatal to that call only.
    Timeout(String),

    /// No dispatch mode produced a session; the message carries each
    /// mode's failure in order.
    DispatchFailed(String),

    /// agent_local output parsed as JSON but named no session id.
    SessionIdMissing(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "runtime io: {}", err),
            Error::Config(msg) => write!(f, "bad configuration: {}", msg),
            Error::Command(msg) => write!(f, "runtime command failed: {}", msg),
            Error::Timeout(msg) => write!(f, "runtime command timed out: {}", msg),
            Error::DispatchFailed(msg) => write!(f, "dispatch exhausted: {}", msg),
            Error::SessionIdMissing(msg) => write!(f, "dispatch returned no session id: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<clawctl_store::Error> for Error {
    fn from(err: clawctl_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
