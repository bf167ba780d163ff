use std::time::Duration;

use honeyhive_types::ExportMode;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const DEFAULT_SERVER_URL: &str = "https://api.honeyhive.ai";
pub const DEFAULT_SOURCE: &str = "production";

/// Tracer configuration. Unset fields resolve from the environment, then
/// fall back to documented defaults. Programmatic values always win.
#[derive(Debug, Clone, Default)]
pub struct TracerConfig {
    /// `HH_API_KEY`; required for non-degraded mode.
    pub api_key: Option<String>,
    /// `HH_PROJECT`; required.
    pub project: Option<String>,
    /// `HH_SOURCE`; defaults to `"production"`.
    pub source: Option<String>,
    /// `HH_API_URL`; defaults to the hosted endpoint.
    pub server_url: Option<String>,
    /// `HH_SESSION_ID`; optional pre-set session.
    pub session_id: Option<Uuid>,
    /// `HH_VERBOSE`; debug logging.
    pub verbose: Option<bool>,
    /// `HH_DISABLE_TRACING`; tracer becomes a no-op.
    pub disable_tracing: Option<bool>,
    /// `HH_DISABLE_HTTP_TRACING`; skip outbound-HTTP instrumentation spans.
    pub disable_http_tracing: Option<bool>,
    /// `HH_OTLP_ENABLED`; defaults to true. When false, the event API is
    /// used instead of OTLP.
    pub otlp_enabled: Option<bool>,
    /// Per-span flushing (no env var).
    pub disable_batch: Option<bool>,

    pub max_batch_size: Option<usize>,
    pub max_batch_delay_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub worker_count: Option<usize>,
    pub http_timeout_ms: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub retry_cap_ms: Option<u64>,

    /// `HH_EXPERIMENT_*`; written into baggage and event metadata.
    pub experiment_id: Option<String>,
    pub experiment_name: Option<String>,
    pub experiment_variant: Option<String>,
    pub experiment_group: Option<String>,
}

impl TracerConfig {
    pub fn new(api_key: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            project: Some(project.into()),
            ..Self::default()
        }
    }

    /// Resolve with priority: explicit value > environment > default.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        let api_key = self.api_key.or_else(|| env_string("HH_API_KEY"));
        let project = self
            .project
            .or_else(|| env_string("HH_PROJECT"))
            .ok_or_else(|| Error::Config("project is required (HH_PROJECT)".to_string()))?;

        let server_url = self
            .server_url
            .or_else(|| env_string("HH_API_URL"))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(Error::Config(format!("invalid server URL: {}", server_url)));
        }

        let session_id = match self.session_id {
            Some(id) => Some(id),
            None => match env_string("HH_SESSION_ID") {
                Some(raw) => Some(
                    Uuid::parse_str(&raw)
                        .map_err(|_| Error::Config(format!("invalid HH_SESSION_ID: {}", raw)))?,
                ),
                None => None,
            },
        };

        let export_mode = if self
            .otlp_enabled
            .or_else(|| env_bool("HH_OTLP_ENABLED"))
            .unwrap_or(true)
        {
            ExportMode::Otlp
        } else {
            ExportMode::Events
        };

        Ok(ResolvedConfig {
            api_key: api_key.filter(|k| !k.is_empty()),
            project,
            source: self
                .source
                .or_else(|| env_string("HH_SOURCE"))
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            server_url,
            session_id,
            verbose: self
                .verbose
                .or_else(|| env_bool("HH_VERBOSE"))
                .unwrap_or(false),
            disable_tracing: self
                .disable_tracing
                .or_else(|| env_bool("HH_DISABLE_TRACING"))
                .unwrap_or(false),
            disable_http_tracing: self
                .disable_http_tracing
                .or_else(|| env_bool("HH_DISABLE_HTTP_TRACING"))
                .unwrap_or(false),
            export_mode,
            disable_batch: self.disable_batch.unwrap_or(false),
            max_batch_size: self.max_batch_size,
            max_batch_delay_ms: self.max_batch_delay_ms,
            queue_capacity: self.queue_capacity,
            worker_count: self.worker_count,
            http_timeout_ms: self.http_timeout_ms,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_ms: self.retry_base_ms,
            retry_cap_ms: self.retry_cap_ms,
            experiment_id: self.experiment_id.or_else(|| env_string("HH_EXPERIMENT_ID")),
            experiment_name: self
                .experiment_name
                .or_else(|| env_string("HH_EXPERIMENT_NAME")),
            experiment_variant: self
                .experiment_variant
                .or_else(|| env_string("HH_EXPERIMENT_VARIANT")),
            experiment_group: self
                .experiment_group
                .or_else(|| env_string("HH_EXPERIMENT_GROUP")),
        })
    }
}

/// Fully resolved configuration held by a tracer instance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Empty/missing keys resolve to `None`: degraded mode.
    pub api_key: Option<String>,
    pub project: String,
    pub source: String,
    pub server_url: String,
    pub session_id: Option<Uuid>,
    pub verbose: bool,
    pub disable_tracing: bool,
    pub disable_http_tracing: bool,
    pub export_mode: ExportMode,
    pub disable_batch: bool,
    pub max_batch_size: Option<usize>,
    pub max_batch_delay_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub worker_count: Option<usize>,
    pub http_timeout_ms: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub retry_cap_ms: Option<u64>,
    pub experiment_id: Option<String>,
    pub experiment_name: Option<String>,
    pub experiment_variant: Option<String>,
    pub experiment_group: Option<String>,
}

impl ResolvedConfig {
    pub fn export_config(&self) -> honeyhive_export::ExportConfig {
        let defaults = honeyhive_export::ExportConfig::default();
        honeyhive_export::ExportConfig {
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            max_batch_size: self.max_batch_size.unwrap_or(defaults.max_batch_size),
            max_batch_delay: self
                .max_batch_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_batch_delay),
            worker_count: self.worker_count.unwrap_or(defaults.worker_count),
            http_timeout: self
                .http_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.http_timeout),
            retry: honeyhive_export::RetryPolicy {
                max_attempts: self
                    .retry_max_attempts
                    .unwrap_or(defaults.retry.max_attempts),
                base: self
                    .retry_base_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.base),
                cap: self
                    .retry_cap_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.cap),
            },
            disable_batch: self.disable_batch,
        }
    }

    pub fn experiment_entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("id", self.experiment_id.as_deref()),
            ("name", self.experiment_name.as_deref()),
            ("variant", self.experiment_variant.as_deref()),
            ("group", self.experiment_group.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True" | "yes"))
}
