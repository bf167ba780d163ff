use std::fmt;

/// Result type for honeyhive-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Missing or malformed configuration (api key, project, URL)
    Config(String),

    /// Rule bundle failed to load
    Bundle(honeyhive_bundle::Error),

    /// Export layer error
    Export(honeyhive_export::Error),

    /// Session bootstrap failed
    Session(String),

    /// Background runtime could not be created
    Runtime(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Bundle(err) => write!(f, "Bundle error: {}", err),
            Error::Export(err) => write!(f, "Export error: {}", err),
            Error::Session(msg) => write!(f, "Session error: {}", msg),
            Error::Runtime(err) => write!(f, "Runtime error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bundle(err) => Some(err),
            Error::Export(err) => Some(err),
            Error::Runtime(err) => Some(err),
            Error::Config(_) | Error::Session(_) => None,
        }
    }
}

impl From<honeyhive_bundle::Error> for Error {
    fn from(err: honeyhive_bundle::Error) -> Self {
        Error::Bundle(err)
    }
}

impl From<honeyhive_export::Error> for Error {
    fn from(err: honeyhive_export::Error) -> Self {
        Error::Export(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Runtime(err)
    }
}
