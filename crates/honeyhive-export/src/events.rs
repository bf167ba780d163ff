use std::time::Duration;

use async_trait::async_trait;

use honeyhive_engine::ProcessedSpan;
use honeyhive_types::CanonicalEvent;

use crate::error::{Error, ExportError, Result};
use crate::transport::{Transport, classify_response};

const EVENTS_PATH: &str = "/events";

/// Event-API transport (C9): canonical events POSTed as a JSON array.
///
/// Every event passing through here carries one of the four canonical
/// event types by construction of [`CanonicalEvent`]; no other value can
/// reach the wire.
pub struct EventTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl EventTransport {
    pub fn new(server_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Serialize(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), EVENTS_PATH),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Transport for EventTransport {
    async fn send(&self, batch: &[ProcessedSpan]) -> std::result::Result<(), ExportError> {
        // Events violating schema invariants never reach the wire.
        let events: Vec<&CanonicalEvent> = batch
            .iter()
            .map(|p| &p.event)
            .filter(|e| e.validate().is_ok())
            .collect();
        if events.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_vec(&events)
            .map_err(|e| ExportError::network(format!("event encode: {}", e)))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ExportError::network(e.to_string()))?;

        classify_response(response).await
    }

    fn describe(&self) -> String {
        format!("events {}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeyhive_engine::SpanData;
    use honeyhive_types::{EventType, SpanKind};

    fn processed(name: &str) -> ProcessedSpan {
        ProcessedSpan {
            data: SpanData::new(name, SpanKind::Internal, [0u8; 16]),
            event: CanonicalEvent::new(
                "proj",
                "production",
                uuid::Uuid::new_v4(),
                name,
                EventType::Tool,
            ),
        }
    }

    #[tokio::test]
    async fn test_post_accepted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let transport =
            EventTransport::new(&server.url(), "test-key", Duration::from_secs(2)).unwrap();
        transport.send(&[processed("a"), processed("b")]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_after_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/events")
            .with_status(429)
            .with_header("retry-after", "3")
            .create_async()
            .await;

        let transport =
            EventTransport::new(&server.url(), "k", Duration::from_secs(2)).unwrap();
        let err = transport.send(&[processed("a")]).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/events")
            .with_status(401)
            .create_async()
            .await;

        let transport =
            EventTransport::new(&server.url(), "bad", Duration::from_secs(2)).unwrap();
        let err = transport.send(&[processed("a")]).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
