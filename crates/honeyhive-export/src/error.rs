use std::fmt;
use std::time::Duration;

/// Result type for honeyhive-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the export layer
#[derive(Debug)]
pub enum Error {
    /// Queue at capacity; span dropped and counted
    QueueFull,

    /// Operation attempted after shutdown
    Shutdown,

    /// Payload serialization failed
    Serialize(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueFull => write!(f, "export queue full"),
            Error::Shutdown => write!(f, "exporter shut down"),
            Error::Serialize(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Outcome classification for a single transport attempt
#[derive(Debug)]
pub enum ExportError {
    /// Network error, 5xx, 408 or 429: retried with backoff. A present
    /// `retry_after` (from the `Retry-After` header) seeds the next delay.
    Transient {
        status: Option<u16>,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Non-retryable 4xx: the batch is dropped immediately.
    Permanent { status: u16, message: String },
}

impl ExportError {
    pub fn network(message: impl Into<String>) -> Self {
        ExportError::Transient {
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP response status.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: String) -> Option<Self> {
        match status {
            200..=299 => None,
            408 | 429 => Some(ExportError::Transient {
                status: Some(status),
                retry_after,
                message,
            }),
            400..=499 => Some(ExportError::Permanent { status, message }),
            _ => Some(ExportError::Transient {
                status: Some(status),
                retry_after,
                message,
            }),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExportError::Transient { retry_after, .. } => *retry_after,
            ExportError::Permanent { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExportError::Transient { .. })
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Transient {
                status, message, ..
            } => match status {
                Some(code) => write!(f, "transient export failure ({}): {}", code, message),
                None => write!(f, "transient export failure: {}", message),
            },
            ExportError::Permanent { status, message } => {
                write!(f, "permanent export failure ({}): {}", status, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ExportError::from_status(204, None, String::new()).is_none());
        assert!(matches!(
            ExportError::from_status(429, None, String::new()),
            Some(ExportError::Transient { .. })
        ));
        assert!(matches!(
            ExportError::from_status(408, None, String::new()),
            Some(ExportError::Transient { .. })
        ));
        assert!(matches!(
            ExportError::from_status(400, None, String::new()),
            Some(ExportError::Permanent { .. })
        ));
        assert!(matches!(
            ExportError::from_status(503, None, String::new()),
            Some(ExportError::Transient { .. })
        ));
    }
}
