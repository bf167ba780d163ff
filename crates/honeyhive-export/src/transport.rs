use std::time::Duration;

use async_trait::async_trait;

use honeyhive_engine::ProcessedSpan;

use crate::error::ExportError;

/// One HTTP-shaped destination for finished spans. A batch is one POST.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[ProcessedSpan]) -> Result<(), ExportError>;

    /// Human-readable destination for logs.
    fn describe(&self) -> String;
}

/// Parse a `Retry-After` header value (delta-seconds form only; HTTP-date
/// values are ignored).
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Map a reqwest response into our classification.
pub(crate) async fn classify_response(
    response: reqwest::Response,
) -> Result<(), ExportError> {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    match ExportError::from_status(status, retry_after, read_body_snippet(response).await) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

async fn read_body_snippet(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body.chars().take(256).collect(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("2")), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(Some(" 10 ")), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
