use std::fmt;

/// The error type for NenDB operations.
///
/// Storage and query errors keep their typed payloads so callers can match
/// on the underlying kind (`PoolExhausted`, `ParseError`, ...).
#[derive(Debug)]
pub enum Error {
    Storage(nendb_storage::Error),
    Query(nendb_query::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage(e) => write!(f, "storage error: {e}"),
            Error::Query(e) => write!(f, "query error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            Error::Query(e) => Some(e),
        }
    }
}

impl From<nendb_storage::Error> for Error {
    fn from(e: nendb_storage::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<nendb_query::Error> for Error {
    fn from(e: nendb_query::Error) -> Self {
        Error::Query(e)
    }
}

/// A specialized Result type for NenDB operations.
pub type Result<T> = std::result::Result<T, Error>;
