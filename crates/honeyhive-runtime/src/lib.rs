//! Tracer runtime: configuration resolution, instance lifecycle, the
//! process-wide provider decision, and the live-tracer registry.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod provider;
pub mod registry;
pub mod session;

pub use config::{ResolvedConfig, TracerConfig};
pub use error::{Error, Result};
pub use lifecycle::TracerShared;
pub use provider::{ProviderRole, ProviderSlot};
pub use registry::TracerRegistry;
