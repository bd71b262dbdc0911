//! NL-SQL analysis service client (http://localhost:8000/nlsql-analyzer by default).
//! One POST per user message: `{ "channel_id", "text" }` in, answer JSON out.

use async_trait::async_trait;
use serde::Serialize;

use crate::answer::RawAnswer;

pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8000/nlsql-analyzer";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("analysis service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("analysis response is not a valid answer: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Asks the analysis service to answer one user message.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, channel_id: &str, text: &str) -> Result<RawAnswer, AnalysisError>;
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    channel_id: &'a str,
    text: &'a str,
}

/// reqwest-backed client for the analysis endpoint.
#[derive(Clone)]
pub struct HttpAnalysisClient {
    url: String,
    client: reqwest::Client,
}

impl HttpAnalysisClient {
    pub fn new(url: Option<String>) -> Self {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_ANALYSIS_URL.to_string());
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, channel_id: &str, text: &str) -> Result<RawAnswer, AnalysisError> {
        let body = AnalysisRequest { channel_id, text };
        log::debug!("analysis: POST {}", self.url);
        let res = self.client.post(&self.url).json(&body).send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(AnalysisError::Status { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_when_unset_or_blank() {
        assert_eq!(HttpAnalysisClient::new(None).url(), DEFAULT_ANALYSIS_URL);
        assert_eq!(
            HttpAnalysisClient::new(Some("  ".into())).url(),
            DEFAULT_ANALYSIS_URL
        );
        assert_eq!(
            HttpAnalysisClient::new(Some("http://nlsql:9000/analyze".into())).url(),
            "http://nlsql:9000/analyze"
        );
    }

    #[test]
    fn request_body_uses_service_field_names() {
        let body = serde_json::to_value(AnalysisRequest {
            channel_id: "msteams",
            text: "how many orders",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"channel_id": "msteams", "text": "how many orders"})
        );
    }

    #[test]
    fn decode_error_is_reported() {
        let err: AnalysisError = serde_json::from_str::<RawAnswer>("[1,2]").unwrap_err().into();
        assert!(err.to_string().starts_with("analysis response is not a valid answer"));
    }
}
