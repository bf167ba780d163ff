use std::fmt;

/// Result type for honeyhive-bundle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the bundle layer
#[derive(Debug)]
pub enum Error {
    /// Bundle artifact not found on disk
    Missing(String),

    /// Bundle artifact failed to deserialize or validate
    Corrupt(String),

    /// IO operation failed
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Missing(path) => write!(f, "Bundle missing: {}", path),
            Error::Corrupt(msg) => write!(f, "Bundle corrupt: {}", msg),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Missing(_) | Error::Corrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}
