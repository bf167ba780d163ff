use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use honeyhive_bundle::Bundle;
use honeyhive_cache::TtlCache;
use honeyhive_types::{AttrMap, Instrumentor, keys};

/// How a provider was identified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Full attribute-key set found in the inverted index
    Exact,
    /// An explicit field value (e.g. `gen_ai.system == "openai"`)
    ValueBased,
    /// A known signature contained in the key set
    Subset,
    /// Nothing matched
    Unknown,
}

/// Result of two-tier detection
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Provider name, or `"unknown"`
    pub provider: String,
    pub instrumentor: Instrumentor,
    /// `matched_keys / |K|`; monitoring only, never drives extraction
    pub confidence: f32,
    pub method: DetectionMethod,
}

impl Detection {
    pub fn unknown(instrumentor: Instrumentor) -> Self {
        Self {
            provider: "unknown".to_string(),
            instrumentor,
            confidence: 0.0,
            method: DetectionMethod::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        self.method != DetectionMethod::Unknown
    }
}

/// Two-tier detector over a span's attribute map.
pub struct DetectionEngine {
    bundle: Arc<Bundle>,
    cache: TtlCache<String, Detection>,
}

impl DetectionEngine {
    pub fn new(bundle: Arc<Bundle>, cache_entries: usize, cache_ttl: Duration) -> Self {
        Self {
            bundle,
            cache: TtlCache::new(cache_entries, cache_ttl),
        }
    }

    /// Detect instrumentor and provider for an attribute map.
    ///
    /// Pure: equal inputs yield equal outputs; the cache key covers every
    /// attribute the decision reads (key set + explicit-field values), so a
    /// cache hit can never change the result.
    pub fn detect(&self, attrs: &AttrMap) -> Detection {
        let instrumentor = detect_instrumentor(attrs);
        let signature = self.signature_hash(attrs);
        self.cache
            .get_or_compute(signature, || self.detect_uncached(attrs, instrumentor))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn detect_uncached(&self, attrs: &AttrMap, instrumentor: Instrumentor) -> Detection {
        let total = attrs.len();
        if total == 0 {
            return Detection::unknown(instrumentor);
        }

        let key_set: BTreeSet<String> = attrs.keys().cloned().collect();

        // 1. Exact signature match.
        if let Some(target) = self.bundle.exact_match(&key_set) {
            return Detection {
                provider: target.provider.clone(),
                instrumentor: parse_instrumentor(&target.instrumentor).unwrap_or(instrumentor),
                confidence: 1.0,
                method: DetectionMethod::Exact,
            };
        }

        // 2. Value-based detection on explicit fields of the detected
        //    instrumentor. Ambiguity across providers is tie-broken by
        //    match count; a residual tie falls through to subset matching.
        if let Some((provider, matched)) = self.value_based(attrs, instrumentor) {
            return Detection {
                provider,
                instrumentor,
                confidence: matched as f32 / total as f32,
                method: DetectionMethod::ValueBased,
            };
        }

        // 3. Subset match, largest signatures first.
        if let Some((target, size)) = self.bundle.subset_match(&key_set) {
            return Detection {
                provider: target.provider.clone(),
                instrumentor: parse_instrumentor(&target.instrumentor).unwrap_or(instrumentor),
                confidence: size as f32 / total as f32,
                method: DetectionMethod::Subset,
            };
        }

        Detection::unknown(instrumentor)
    }

    fn value_based(&self, attrs: &AttrMap, instrumentor: Instrumentor) -> Option<(String, usize)> {
        let prefix = instrumentor.prefix();
        let mut best: Option<(String, usize)> = None;
        let mut tied = false;

        let mut candidates: Vec<(&str, usize)> = Vec::new();
        for (key, value) in attrs {
            if let Some(prefix) = prefix
                && !key.starts_with(prefix)
            {
                continue;
            }
            let matched = self
                .bundle
                .provider_for_value(key, value.to_wire_string().as_str());
            if let Some(provider) = matched {
                match candidates.iter_mut().find(|(p, _)| *p == provider) {
                    Some((_, count)) => *count += 1,
                    None => candidates.push((provider, 1)),
                }
            }
        }

        for (provider, count) in candidates {
            match &best {
                Some((_, best_count)) if count == *best_count => tied = true,
                Some((_, best_count)) if count > *best_count => {
                    best = Some((provider.to_string(), count));
                    tied = false;
                }
                None => best = Some((provider.to_string(), count)),
                _ => {}
            }
        }

        if tied { None } else { best }
    }

    /// Cache key: every attribute key, plus the values of keys that
    /// participate in value-based detection.
    fn signature_hash(&self, attrs: &AttrMap) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in attrs {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            if self.is_value_key(key) {
                hasher.update(value.to_wire_string().as_bytes());
                hasher.update([1u8]);
            }
        }
        format!("{:x}", hasher.finalize())
    }

    fn is_value_key(&self, key: &str) -> bool {
        self.bundle.value_keys().any(|k| k == key)
    }
}

/// Tier 1: instrumentor by attribute-prefix tally. O(|A|), fixed counter
/// array, ties broken by the order of `keys::INSTRUMENTOR_PREFIXES`.
pub fn detect_instrumentor(attrs: &AttrMap) -> Instrumentor {
    let mut counts = [0usize; 3];
    for key in attrs.keys() {
        for (i, prefix) in keys::INSTRUMENTOR_PREFIXES.iter().enumerate() {
            if key.starts_with(prefix) {
                counts[i] += 1;
                break;
            }
        }
    }

    let mut best = 0usize;
    let mut best_count = 0usize;
    for (i, count) in counts.iter().enumerate() {
        if *count > best_count {
            best = i;
            best_count = *count;
        }
    }

    if best_count == 0 {
        return Instrumentor::Unknown;
    }
    match best {
        0 => Instrumentor::Traceloop,
        1 => Instrumentor::Openinference,
        _ => Instrumentor::Openlit,
    }
}

pub(crate) fn parse_instrumentor(s: &str) -> Option<Instrumentor> {
    match s {
        "traceloop" => Some(Instrumentor::Traceloop),
        "openinference" => Some(Instrumentor::Openinference),
        "openlit" => Some(Instrumentor::Openlit),
        _ => None,
    }
}
