//! Rule-bundle loading for the HoneyHive SDK.
//!
//! The bundle is a pre-compiled, read-only artifact: provider signatures,
//! inverted signature indexes, per-instrumentor extraction rule tables, and
//! pricing tables. The build pipeline that compiles it from DSL sources is
//! out of scope here; the runtime only loads and indexes it.

pub mod error;
pub mod loader;
pub mod pricing;
pub mod schema;

pub use error::{Error, Result};
pub use loader::{Bundle, is_stale};
pub use pricing::ModelPrice;
pub use schema::{
    BuildMetadata, FieldRule, FieldTable, ProviderRules, RuleBundle, RulePattern, SignatureEntry,
    TransformKind,
};
