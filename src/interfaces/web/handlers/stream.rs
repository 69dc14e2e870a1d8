use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::core::types::Message;
use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthUser;
use crate::interfaces::web::error::GatewayError;

/// Relay the backend's event stream for one job, stamping each message with a per-job `seq`
/// and recording it in the owning session's history.
///
/// History holds what has been relayed. Relaying the same job again (a reconnect, a second
/// client) records nothing new for `seq` values already stored.
pub async fn stream_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<axum::response::Response, GatewayError> {
    let Some(session_id) = state.store.session_for_job(&job_id).await? else {
        return Err(GatewayError::NotFound);
    };
    match state.store.get_chat(&session_id).await? {
        Some(record) if record.user_id == user.user_id => {}
        _ => return Err(GatewayError::NotFound),
    }

    let mut upstream = state.backend.open_stream(&job_id).await?;
    info!("Established stream relay for job {}", job_id);

    let store = state.store.clone();
    let events = async_stream::stream! {
        let mut seq: u64 = 0;
        while let Some(item) = upstream.next().await {
            let data = match item {
                Ok(data) => data,
                Err(e) => {
                    warn!("Backend stream for job {} failed: {}", job_id, e);
                    yield Err(e);
                    break;
                }
            };

            let mut message = match serde_json::from_str::<Message>(&data) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping malformed event for job {}: {}", job_id, e);
                    continue;
                }
            };
            seq += 1;
            message.seq = Some(seq);
            if message.id.is_none() {
                message.id = Some(format!("{}-{}", job_id, seq));
            }
            if message.timestamp.is_none() {
                message.timestamp = Some(chrono::Utc::now().timestamp_millis());
            }

            match store.append_message(&session_id, Some(&job_id), &message).await {
                Ok(true) => {}
                Ok(false) => debug!("Job {} seq {} already recorded", job_id, seq),
                Err(e) => {
                    warn!("Failed to record streamed message for session {}: {}", session_id, e)
                }
            }

            match Event::default().json_data(&message) {
                Ok(event) => yield Ok::<_, std::io::Error>(event),
                Err(e) => warn!("Failed to encode event for job {}: {}", job_id, e),
            }
        }
        info!("Closed stream relay for job {}", job_id);
    };

    Ok(Sse::new(events).into_response())
}

#[cfg(test)]
mod tests {
    use crate::core::types::{ChatRecord, Message, Role};
    use crate::interfaces::web::build_api_router;
    use crate::interfaces::web::test_support::{FakeBackend, test_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tower::util::ServiceExt;

    async fn seed(store: &crate::core::store::ChatStore, user: &str) {
        let record = ChatRecord {
            id: "s1".into(),
            title: "What is MEV?".into(),
            user_id: user.into(),
            created_at: 1,
            job_id: "job-1".into(),
        };
        store
            .record_submission(&record, &Message::new(Role::User, "What is MEV?"))
            .await
            .unwrap();
    }

    async fn relay_body(app: axum::Router, token: &str) -> String {
        let resp = app.oneshot(get("/api/stream/job-1", token)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn data_lines(body: &str) -> Vec<serde_json::Value> {
        body.lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .map(|d| serde_json::from_str(d.trim()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn relays_events_in_order_with_seq_and_records_them() {
        let backend = Arc::new(FakeBackend {
            events: vec![
                r#"{"role":"assistant","content":"partial answer"}"#.to_string(),
                "not json".to_string(),
                r#"{"role":"assistant","content":"full answer"}"#.to_string(),
            ],
            ..FakeBackend::default()
        });
        let (state, token) = test_state(backend).await;
        seed(&state.store, "alice").await;
        let store = state.store.clone();

        let events = data_lines(&relay_body(build_api_router(state), &token).await);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["content"], "partial answer");
        assert_eq!(events[0]["seq"], 1);
        assert_eq!(events[1]["content"], "full answer");
        assert_eq!(events[1]["seq"], 2);

        let history = store.messages("s1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[2].seq, Some(2));
    }

    #[tokio::test]
    async fn relaying_a_job_again_does_not_duplicate_history() {
        let backend = Arc::new(FakeBackend {
            events: vec![r#"{"role":"assistant","content":"answer"}"#.to_string()],
            ..FakeBackend::default()
        });
        let (state, token) = test_state(backend.clone()).await;
        seed(&state.store, "alice").await;
        let store = state.store.clone();
        let app = build_api_router(state);

        let first = data_lines(&relay_body(app.clone(), &token).await);
        let second = data_lines(&relay_body(app, &token).await);
        for events in [&first, &second] {
            assert_eq!(events.len(), 1);
            assert_eq!(events[0]["seq"], 1);
            assert_eq!(events[0]["id"], "job-1-1");
        }
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 2);

        let assistant: Vec<(String, Option<u64>)> = store
            .messages("s1")
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| (m.content, m.seq))
            .collect();
        assert_eq!(assistant, vec![("answer".to_string(), Some(1))]);
    }

    #[tokio::test]
    async fn unknown_or_foreign_job_is_not_found() {
        let backend = Arc::new(FakeBackend::default());
        let (state, token) = test_state(backend.clone()).await;
        let app = build_api_router(state.clone());

        let resp = app
            .clone()
            .oneshot(get("/api/stream/nope", &token))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        seed(&state.store, "bob").await;
        let resp = app.oneshot(get("/api/stream/job-1", &token)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upstream_failure_aborts_the_response_body() {
        let backend = Arc::new(FakeBackend {
            events: vec![r#"{"role":"assistant","content":"partial"}"#.to_string()],
            fail_stream_at_end: true,
            ..FakeBackend::default()
        });
        let (state, token) = test_state(backend).await;
        seed(&state.store, "alice").await;

        let resp = build_api_router(state)
            .oneshot(get("/api/stream/job-1", &token))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            axum::body::to_bytes(resp.into_body(), 1024 * 1024)
                .await
                .is_err()
        );
    }
}
