use std::fmt;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the SDK facade
#[derive(Debug)]
pub enum Error {
    /// Initialization failed (configuration, runtime, exporter setup)
    Init(honeyhive_runtime::Error),

    /// Span-level operation failed (e.g. enrichment after end)
    Span(honeyhive_engine::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init(err) => write!(f, "Init error: {}", err),
            Error::Span(err) => write!(f, "Span error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Init(err) => Some(err),
            Error::Span(err) => Some(err),
        }
    }
}

impl From<honeyhive_runtime::Error> for Error {
    fn from(err: honeyhive_runtime::Error) -> Self {
        Error::Init(err)
    }
}

impl From<honeyhive_engine::Error> for Error {
    fn from(err: honeyhive_engine::Error) -> Self {
        Error::Span(err)
    }
}
