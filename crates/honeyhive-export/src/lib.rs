//! Export layer: bounded queue, batching workers, retry with backoff, and
//! the two transports (OTLP/HTTP traces, HoneyHive event API).
//!
//! Producers never block on the network: enqueue is a bounded `try_send`
//! that drops and counts under sustained overload. A fixed worker pool
//! drains the queue; each worker owns an HTTP client with keep-alive and is
//! cancellable. `flush` is deadline-bound regardless of queue size;
//! `shutdown` is flush + close, idempotent.

pub mod config;
pub mod counters;
pub mod error;
pub mod events;
pub mod otlp;
pub mod pipeline;
pub mod retry;
pub mod transport;

pub use config::ExportConfig;
pub use counters::{ExportCounters, ExportStats};
pub use error::{Error, ExportError, Result};
pub use events::EventTransport;
pub use otlp::OtlpTransport;
pub use pipeline::{ExportHandle, ExportPipeline, FlushReport};
pub use retry::RetryPolicy;
pub use transport::Transport;
