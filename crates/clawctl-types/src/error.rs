use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures the schema layer itself can produce. Almost everything here
/// is pure, so the surface is deliberately small.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),

    /// A value that should match one of the domain enums or formats did
    /// not (bad class label, malformed timestamp, ...).
    Invalid(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io: {}", err),
            Error::Invalid(msg) => write!(f, "invalid value: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
