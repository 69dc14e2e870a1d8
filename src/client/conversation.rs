use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::api::{ChatApi, ClientError, SubmitRequest};
use super::consumer::{ConnectionState, ConsumerEvent, Delivery, EventSource, StreamingConsumer};
use super::{Notice, Notifier};
use crate::core::metadata::StructuredMetadataEntry;
use crate::core::types::Message;

pub const MISSING_JOB_ID: &str = "Backend response does not contain job_id.";
pub const STREAM_FAILED: &str = "Error connecting to chat updates.";

/// The effect of one applied stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Appended(Message),
    Failed,
    Ended,
    Ignored,
}

/// Client-side state of one chat session. Owned by a single task; streamed events are applied
/// through [`Conversation::next_event`] or [`Conversation::drain_events`].
pub struct Conversation {
    api: Arc<dyn ChatApi>,
    notifier: Arc<dyn Notifier>,
    consumer: StreamingConsumer,
    events: mpsc::UnboundedReceiver<ConsumerEvent>,
    session_id: Option<String>,
    messages: Vec<Message>,
    sources: Vec<StructuredMetadataEntry>,
    input: String,
    loading: bool,
    last_seq: Option<u64>,
}

impl Conversation {
    pub fn new(
        api: Arc<dyn ChatApi>,
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn Notifier>,
        session_id: Option<String>,
    ) -> Self {
        let (consumer, events) = StreamingConsumer::new(source);
        Self {
            api,
            notifier,
            consumer,
            events,
            session_id,
            messages: Vec::new(),
            sources: Vec::new(),
            input: String::new(),
            loading: false,
            last_seq: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Metadata entries returned with the latest successful submission.
    pub fn sources(&self) -> &[StructuredMetadataEntry] {
        &self.sources
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn job_id(&self) -> Option<&str> {
        self.consumer.job_id()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.consumer.state()
    }

    fn raise(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    fn raise_client_error(&self, err: ClientError) {
        match err {
            ClientError::Unauthorized => self.raise(Notice::LoginRequired),
            other => self.raise(Notice::Error(other.to_string())),
        }
    }

    /// Submit `content`. On success the returned job id replaces the current one and its stream
    /// is opened; on failure nothing but the loading flag and pending input changes.
    pub async fn append(&mut self, content: &str) -> Option<String> {
        self.loading = true;
        self.input.clear();

        let request = SubmitRequest {
            message: content.to_string(),
            id: self.session_id.clone(),
        };
        let result = self.api.submit(&request).await;
        self.loading = false;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat submission failed: {}", e);
                self.raise_client_error(e);
                return None;
            }
        };
        let Some(job_id) = reply.job_id.filter(|id| !id.is_empty()) else {
            warn!("Gateway reply carried no job id");
            self.raise(Notice::Error(MISSING_JOB_ID.to_string()));
            return None;
        };

        if self.session_id.is_none() {
            self.session_id = reply.id;
        }
        self.sources = reply.structured_metadata;
        info!("Submitted message, following job {}", job_id);
        self.last_seq = None;
        self.consumer.set_job_id(Some(job_id.clone())).await;
        Some(job_id)
    }

    /// Replace the message list with the gateway's history of `session_id`.
    pub async fn reload(&mut self, session_id: &str) -> bool {
        self.loading = true;
        let result = self.api.history(session_id).await;
        self.loading = false;

        match result {
            Ok(messages) => {
                self.messages = messages;
                self.session_id = Some(session_id.to_string());
                true
            }
            Err(e) => {
                warn!("Failed to reload session {}: {}", session_id, e);
                self.raise_client_error(e);
                false
            }
        }
    }

    /// Clear the loading flag. The stream stays open.
    pub fn stop(&mut self) {
        self.loading = false;
    }

    pub async fn cancel(&mut self) {
        self.loading = false;
        self.consumer.close().await;
    }

    pub async fn shutdown(&mut self) {
        self.consumer.close().await;
    }

    /// Apply the next stream event, waiting for one while a connection is live. Returns `None`
    /// when nothing is queued and no connection is open, e.g. after the stream ended, failed
    /// or was cancelled.
    pub async fn next_event(&mut self) -> Option<StreamUpdate> {
        let event = match self.events.try_recv() {
            Ok(event) => event,
            Err(_) if !self.consumer.is_connected() => return None,
            Err(_) => self.events.recv().await?,
        };
        Some(self.apply(event))
    }

    /// Apply every event that has already arrived.
    pub fn drain_events(&mut self) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            updates.push(self.apply(event));
        }
        updates
    }

    fn apply(&mut self, event: ConsumerEvent) -> StreamUpdate {
        match self.consumer.accept(event) {
            Delivery::Stale => StreamUpdate::Ignored,
            Delivery::Data(data) => {
                let message = match serde_json::from_str::<Message>(&data) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Skipping malformed stream event: {}", e);
                        return StreamUpdate::Ignored;
                    }
                };
                if let Some(seq) = message.seq {
                    if self.last_seq.is_some_and(|last| seq <= last) {
                        debug!("Dropping replayed event with seq {}", seq);
                        return StreamUpdate::Ignored;
                    }
                    self.last_seq = Some(seq);
                }
                self.messages.push(message.clone());
                StreamUpdate::Appended(message)
            }
            Delivery::Failed(reason) => {
                warn!("Chat updates failed: {}", reason);
                self.loading = false;
                self.raise(Notice::Error(STREAM_FAILED.to_string()));
                StreamUpdate::Failed
            }
            Delivery::Ended => StreamUpdate::Ended,
        }
    }
}
