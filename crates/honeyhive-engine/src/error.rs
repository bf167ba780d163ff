use std::fmt;

/// Result type for honeyhive-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the span pipeline
#[derive(Debug)]
pub enum Error {
    /// Mutation attempted after the span ended
    SpanEnded(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SpanEnded(name) => write!(f, "Span already ended: {}", name),
        }
    }
}

impl std::error::Error for Error {}
