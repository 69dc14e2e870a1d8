use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::core::sse::{EventStream, response_reader};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend failed to process chat message with status {status}")]
    Status { status: u16, body: String },
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend returned an invalid reply: {0}")]
    InvalidReply(String),
}

/// Reply of the compute backend to a submitted message.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub job_id: Option<String>,
    pub response: Value,
    pub formatted_metadata: Option<String>,
}

impl BackendReply {
    /// Interpret the backend's JSON body. The answer may be nested as `response.response`
    /// and the job id may come back as a number.
    pub fn from_json(body: &Value) -> Result<Self, BackendError> {
        let Some(obj) = body.as_object() else {
            return Err(BackendError::InvalidReply(format!(
                "expected a JSON object, got {}",
                body
            )));
        };

        let job_id = match obj.get("job_id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let response = obj
            .get("response")
            .map(|r| match r.get("response") {
                Some(inner) if !inner.is_null() => inner.clone(),
                _ => r.clone(),
            })
            .unwrap_or(Value::Null);

        let formatted_metadata = obj
            .get("formatted_metadata")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            job_id,
            response,
            formatted_metadata,
        })
    }
}

/// The external compute service that answers chat messages asynchronously.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn submit(&self, message: &str) -> Result<BackendReply, BackendError>;
    async fn open_stream(&self, job_id: &str) -> Result<EventStream, BackendError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submit(&self, message: &str) -> Result<BackendReply, BackendError> {
        let url = format!("{}/chat", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = res
            .json()
            .await
            .map_err(|e| BackendError::InvalidReply(e.to_string()))?;
        debug!("Received response from backend: {}", body);
        BackendReply::from_json(&body)
    }

    async fn open_stream(&self, job_id: &str) -> Result<EventStream, BackendError> {
        let url = format!("{}/stream/{}", self.base_url, job_id);
        let res = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response_reader(res).into_data_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_response_is_unwrapped() {
        let reply = BackendReply::from_json(&json!({
            "job_id": "j1",
            "response": { "response": "MEV is..." },
            "formatted_metadata": "- [A](https://a)"
        }))
        .unwrap();
        assert_eq!(reply.job_id.as_deref(), Some("j1"));
        assert_eq!(reply.response, json!("MEV is..."));
        assert_eq!(reply.formatted_metadata.as_deref(), Some("- [A](https://a)"));
    }

    #[test]
    fn flat_response_and_numeric_job_id() {
        let reply = BackendReply::from_json(&json!({ "job_id": 42, "response": "ok" })).unwrap();
        assert_eq!(reply.job_id.as_deref(), Some("42"));
        assert_eq!(reply.response, json!("ok"));
        assert!(reply.formatted_metadata.is_none());
    }

    #[test]
    fn missing_job_id_is_reported_as_none() {
        let reply = BackendReply::from_json(&json!({ "response": "ok", "job_id": "" })).unwrap();
        assert!(reply.job_id.is_none());
    }

    #[test]
    fn non_object_reply_is_invalid() {
        assert!(matches!(
            BackendReply::from_json(&json!(["nope"])),
            Err(BackendError::InvalidReply(_))
        ));
    }
}
