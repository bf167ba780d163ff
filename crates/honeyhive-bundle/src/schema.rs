use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

// NOTE: Artifact layout
//
// The on-disk shape mirrors what the build pipeline emits:
// - providers: detection material per provider (signatures as sorted key
//   lists, explicit field/value pairs).
// - signature_index / signature_index_by_size / pattern_to_provider: the
//   inverted indexes, collision-resolved first-writer-wins at build time.
// - extraction: per-instrumentor field tables; providers may carry override
//   tables merged on top when an extractor is compiled.
// - pricing: per-provider per-model USD prices per 1M tokens.
//
// Everything here is read-only after load.

/// Deserialized rule bundle artifact
#[derive(Debug, Clone, Deserialize)]
pub struct RuleBundle {
    pub version: String,
    pub build_metadata: BuildMetadata,
    pub providers: HashMap<String, ProviderRules>,
    pub signature_index: Vec<SignatureEntry>,
    #[serde(default)]
    pub signature_index_by_size: BTreeMap<usize, Vec<SignatureEntry>>,
    pub pattern_to_provider: HashMap<String, PatternTarget>,
    pub extraction: HashMap<String, FieldTable>,
    #[serde(default)]
    pub pricing: HashMap<String, HashMap<String, crate::pricing::ModelPrice>>,
}

/// Provenance of the compiled artifact
#[derive(Debug, Clone, Deserialize)]
pub struct BuildMetadata {
    pub built_at: String,
    #[serde(default)]
    pub source_versions: HashMap<String, String>,
    #[serde(default)]
    pub rule_count: usize,
}

/// Detection material for a single provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRules {
    /// Attribute-key signatures observed for this provider (sorted lists;
    /// the loader freezes them into sets).
    #[serde(default)]
    pub signatures: Vec<Vec<String>>,
    /// attribute key -> accepted values; a match identifies this provider.
    #[serde(default)]
    pub explicit_fields: HashMap<String, Vec<String>>,
    /// Field-table overrides merged over the instrumentor table when an
    /// extractor is compiled for this provider.
    #[serde(default)]
    pub extraction_overrides: HashMap<String, FieldTable>,
}

/// One inverted-index record
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureEntry {
    pub keys: Vec<String>,
    pub pattern_id: String,
}

/// Resolution of a pattern id
#[derive(Debug, Clone, Deserialize)]
pub struct PatternTarget {
    pub provider: String,
    pub instrumentor: String,
}

/// Ordered rule lists keyed by canonical field path (`inputs.chat_history`,
/// `config.model`, ...). The first rule producing a non-null value wins.
pub type FieldTable = BTreeMap<String, Vec<FieldRule>>;

/// A single extraction rule
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub pattern: RulePattern,
    pub transform: TransformKind,
}

/// Where a rule reads from
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePattern {
    /// A single attribute key.
    Exact { key: String },
    /// Every attribute whose key starts with one of the prefixes; yields an
    /// object of `suffix -> value`.
    Prefix { prefixes: Vec<String> },
    /// Indexed flatten: `{base}.{i}.{field}` keys reconstructed into an
    /// ordered array of objects.
    Indexed { base: String, fields: Vec<String> },
    /// An ordered list of keys; yields an array of their values. Used by
    /// `extract_first_value` and `cost_calculate` (model, prompt tokens,
    /// completion tokens).
    Keys { keys: Vec<String> },
}

/// Pure transform applied to a pattern's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Direct,
    JsonParseOrDirect,
    ParseMessages,
    ParseFlattenedMessages,
    ExtractContentFromMessages,
    ExtractFirstValue,
    CostCalculate,
    FinishReasonNormalize,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Direct => "direct",
            TransformKind::JsonParseOrDirect => "json_parse_or_direct",
            TransformKind::ParseMessages => "parse_messages",
            TransformKind::ParseFlattenedMessages => "parse_flattened_messages",
            TransformKind::ExtractContentFromMessages => "extract_content_from_messages",
            TransformKind::ExtractFirstValue => "extract_first_value",
            TransformKind::CostCalculate => "cost_calculate",
            TransformKind::FinishReasonNormalize => "finish_reason_normalize",
        }
    }
}
