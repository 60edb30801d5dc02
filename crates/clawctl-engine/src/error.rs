use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Engine failures split into what the lower layers report and what the
/// caller got wrong. Only `Validation` is ever the caller's fault; it is
/// fatal for that one query and leaves every other query path intact.
#[derive(Debug)]
pub enum Error {
    Store(clawctl_store::Error),
    Usage(clawctl_usage::Error),
    Io(std::io::Error),

    /// Caller-supplied query input was rejected during normalization.
    Validation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "{}", err),
            Error::Usage(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "engine io: {}", err),
            Error::Validation(msg) => write!(f, "invalid query: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Usage(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Validation(_) => None,
        }
    }
}

impl From<clawctl_store::Error> for Error {
    fn from(err: clawctl_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<clawctl_usage::Error> for Error {
    fn from(err: clawctl_usage::Error) -> Self {
        Error::Usage(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
