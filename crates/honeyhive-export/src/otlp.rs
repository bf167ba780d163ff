use std::time::Duration;

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{
    ResourceSpans, ScopeSpans, Span as OtlpSpan, Status, span, status,
};
use prost::Message;

use honeyhive_engine::ProcessedSpan;
use honeyhive_engine::SpanData;
use honeyhive_types::{AttrValue, SpanKind, SpanStatus};

use crate::error::{Error, ExportError, Result};
use crate::transport::{Transport, classify_response};

const OTLP_PATH: &str = "/opentelemetry/v1/traces";
const SCOPE_NAME: &str = "honeyhive-rust-sdk";
const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// OTLP/HTTP traces transport (C8). One batch is one POST of an
/// `ExportTraceServiceRequest`, protobuf by default, JSON when configured.
pub struct OtlpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    project: String,
    source: String,
    use_json: bool,
}

impl OtlpTransport {
    pub fn new(
        server_url: &str,
        api_key: &str,
        project: &str,
        source: &str,
        timeout: Duration,
        use_json: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Serialize(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), OTLP_PATH),
            api_key: api_key.to_string(),
            project: project.to_string(),
            source: source.to_string(),
            use_json,
        })
    }
}

#[async_trait]
impl Transport for OtlpTransport {
    async fn send(&self, batch: &[ProcessedSpan]) -> std::result::Result<(), ExportError> {
        let request = build_request(batch);
        let (body, content_type) = if self.use_json {
            let body = serde_json::to_vec(&request)
                .map_err(|e| ExportError::network(format!("otlp json encode: {}", e)))?;
            (body, "application/json")
        } else {
            (request.encode_to_vec(), "application/x-protobuf")
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("X-Project", &self.project)
            .header("X-Source", &self.source)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| ExportError::network(e.to_string()))?;

        classify_response(response).await
    }

    fn describe(&self) -> String {
        format!("otlp {}", self.endpoint)
    }
}

fn build_request(batch: &[ProcessedSpan]) -> ExportTraceServiceRequest {
    let spans = batch.iter().map(|p| span_to_otlp(&p.data)).collect();

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![string_kv("service.name", SCOPE_NAME)],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: SCOPE_NAME.to_string(),
                    version: SCOPE_VERSION.to_string(),
                    ..Default::default()
                }),
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn span_to_otlp(data: &SpanData) -> OtlpSpan {
    let attributes = data
        .attributes
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: Some(attr_to_any(value)),
        })
        .collect();

    let (code, message) = match &data.status {
        SpanStatus::Unset => (status::StatusCode::Unset, String::new()),
        SpanStatus::Ok => (status::StatusCode::Ok, String::new()),
        SpanStatus::Error(msg) => (status::StatusCode::Error, msg.clone()),
    };

    OtlpSpan {
        trace_id: data.trace_id.to_vec(),
        span_id: data.span_id.to_vec(),
        parent_span_id: data.parent_span_id.map(|p| p.to_vec()).unwrap_or_default(),
        name: data.name.clone(),
        kind: kind_to_otlp(data.kind) as i32,
        start_time_unix_nano: data.start_ns.max(0) as u64,
        end_time_unix_nano: data.end_ns.max(0) as u64,
        attributes,
        status: Some(Status {
            code: code as i32,
            message,
        }),
        ..Default::default()
    }
}

fn kind_to_otlp(kind: SpanKind) -> span::SpanKind {
    match kind {
        SpanKind::Internal => span::SpanKind::Internal,
        SpanKind::Client => span::SpanKind::Client,
        SpanKind::Server => span::SpanKind::Server,
        SpanKind::Producer => span::SpanKind::Producer,
        SpanKind::Consumer => span::SpanKind::Consumer,
    }
}

fn attr_to_any(value: &AttrValue) -> AnyValue {
    let inner = match value {
        AttrValue::Str(s) => any_value::Value::StringValue(s.clone()),
        AttrValue::Int(n) => any_value::Value::IntValue(*n),
        AttrValue::Float(f) => any_value::Value::DoubleValue(*f),
        AttrValue::Bool(b) => any_value::Value::BoolValue(*b),
    };
    AnyValue { value: Some(inner) }
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeyhive_types::keys;

    #[test]
    fn test_span_conversion() {
        let mut data = SpanData::new("ChatCompletion", SpanKind::Client, [7u8; 16]);
        data.start_ns = 1_000;
        data.end_ns = 2_000;
        data.set_attribute(keys::PROCESSED, "true");
        data.set_attribute("honeyhive_metadata.prompt_tokens", 10i64);
        data.status = SpanStatus::Error("boom".to_string());

        let otlp = span_to_otlp(&data);
        assert_eq!(otlp.trace_id, vec![7u8; 16]);
        assert_eq!(otlp.name, "ChatCompletion");
        assert_eq!(otlp.kind, span::SpanKind::Client as i32);
        assert_eq!(otlp.start_time_unix_nano, 1_000);
        assert_eq!(otlp.end_time_unix_nano, 2_000);
        assert_eq!(otlp.status.as_ref().unwrap().code, status::StatusCode::Error as i32);

        let processed = otlp
            .attributes
            .iter()
            .find(|kv| kv.key == keys::PROCESSED)
            .unwrap();
        assert_eq!(
            processed.value.as_ref().unwrap().value,
            Some(any_value::Value::StringValue("true".to_string()))
        );
    }

    #[test]
    fn test_request_encodes_to_protobuf() {
        let data = SpanData::new("s", SpanKind::Internal, [1u8; 16]);
        let event = honeyhive_types::CanonicalEvent::new(
            "p",
            "production",
            uuid::Uuid::new_v4(),
            "s",
            honeyhive_types::EventType::Tool,
        );
        let request = build_request(&[ProcessedSpan { data, event }]);
        let bytes = request.encode_to_vec();
        assert!(!bytes.is_empty());

        let decoded = ExportTraceServiceRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.resource_spans.len(), 1);
        assert_eq!(decoded.resource_spans[0].scope_spans[0].spans.len(), 1);
    }
}
