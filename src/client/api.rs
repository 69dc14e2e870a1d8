use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::consumer::EventSource;
use super::credentials::Credentials;
use crate::core::metadata::StructuredMetadataEntry;
use crate::core::sse::{EventStream, response_reader};
use crate::core::types::{ChatRecord, Message};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Login required")]
    Unauthorized,
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub structured_metadata: Vec<StructuredMetadataEntry>,
}

/// The gateway operations the conversation depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, ClientError>;
    async fn history(&self, session_id: &str) -> Result<Vec<Message>, ClientError>;
}

/// HTTP client for the mevchat gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    api_base: String,
    credentials: Credentials,
}

impl GatewayClient {
    pub fn new(api_url: &str, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            api_base: format!("{}/api", api_url.trim_end_matches('/')),
            credentials,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn chats(&self) -> Result<Vec<ChatRecord>, ClientError> {
        let url = format!("{}/chats", self.api_base);
        let res = self.authorized(self.client.get(&url)).send().await?;
        Ok(check_status(res).await?.json().await?)
    }
}

/// Map a non-success response to a [`ClientError`], using the gateway's `{error}` body when present.
async fn check_status(res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    let body = res.text().await.unwrap_or_default();
    debug!("Gateway returned {}: {}", status, body);
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChatApi for GatewayClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, ClientError> {
        let url = format!("{}/chat", self.api_base);
        let res = self
            .authorized(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, ClientError> {
        let url = format!("{}/chat/history", self.api_base);
        let res = self
            .authorized(self.client.get(&url))
            .query(&[("id", session_id)])
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }
}

#[async_trait]
impl EventSource for GatewayClient {
    async fn open(&self, job_id: &str) -> Result<EventStream, ClientError> {
        let url = format!("{}/stream/{}", self.api_base, job_id);
        let res = self
            .authorized(self.client.get(&url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        Ok(response_reader(check_status(res).await?).into_data_stream())
    }
}
