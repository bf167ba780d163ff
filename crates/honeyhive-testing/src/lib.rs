//! Testing infrastructure for HoneyHive integration tests.
//!
//! - [`world::PipelineWorld`]: an in-memory span pipeline (real detection,
//!   extraction and event assembly; captured instead of exported)
//! - [`fixtures`]: vendor attribute sets for the supported instrumentors
//! - [`assertions`]: canonical-event invariant checks

pub mod assertions;
pub mod capture;
pub mod fixtures;
pub mod world;

pub use capture::CaptureSink;
pub use world::PipelineWorld;
