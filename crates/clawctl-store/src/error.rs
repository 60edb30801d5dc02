use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Store-layer failures. Unique-key violations are load-bearing (leases
/// and actionable-event dedup both arbitrate through them), so they get
/// a dedicated probe instead of string matching at call sites.
#[derive(Debug)]
pub enum Error {
    Database(rusqlite::Error),
    Io(std::io::Error),

    /// Bad query input or a row in an impossible state.
    Query(String),
}

impl Error {
    /// True when the underlying failure is a unique-key violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "sqlite: {}", err),
            Error::Io(err) => write!(f, "store io: {}", err),
            Error::Query(msg) => write!(f, "query: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Query(_) => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
