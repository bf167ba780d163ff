use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};

const SESSION_START_PATH: &str = "/session/start";

#[derive(Debug, Deserialize)]
struct SessionStartResponse {
    session_id: Option<Uuid>,
}

/// Session bootstrap client. One call at tracer init; every failure is a
/// graceful degradation, never a crash.
pub struct SessionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SessionClient {
    pub fn new(server_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Session(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}{}",
                server_url.trim_end_matches('/'),
                SESSION_START_PATH
            ),
            api_key: api_key.to_string(),
        })
    }

    /// Start a session, returning the backend-assigned id (or echoing the
    /// requested one).
    pub async fn start(
        &self,
        project: &str,
        source: &str,
        session_id: Uuid,
        session_name: &str,
    ) -> Result<Uuid> {
        let body = json!({
            "project": project,
            "source": source,
            "session_id": session_id,
            "session_name": session_name,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Session(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Session(format!(
                "session start returned {}",
                response.status()
            )));
        }

        let parsed: SessionStartResponse = response
            .json()
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        Ok(parsed.session_id.unwrap_or(session_id))
    }
}
