
use e2e_harness::{GatewayHarness, MockBackend, TestResult};
use reqwest::Method;
use serde_json::{Value, json};

async fn start() -> TestResult<Option<(MockBackend, GatewayHarness)>> {
    let backend = match MockBackend::start().await {
        Ok(backend) => backend,
        Err(err) if err.to_string().contains("Operation not permitted") => {
            eprintln!("Skipping E2E test: socket bind not permitted");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let gateway = match GatewayHarness::spawn(&backend.base_url()).await {
        Ok(gateway) => gateway,
        Err(err) if err.to_string().contains("Operation not permitted") => {
            eprintln!("Skipping E2E test: gateway socket bind not permitted");
            backend.shutdown().await;
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    Ok(Some((backend, gateway)))
}

fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str(data.trim()).ok())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submission_stream_and_history_round_trip() -> TestResult<()> {
    let Some((backend, gateway)) = start().await? else {
        return Ok(());
    };
    let token = gateway.issue_token("alice").await?;

    let (status, reply) = gateway
        .request_json(
            Method::POST,
            "/api/chat",
            Some(&token),
            Some(r#"{"message":"What is MEV?"}"#),
        )
        .await?;
    assert_eq!(status, 200, "submit failed: {}", reply);
    assert_eq!(reply["role"], "assistant");
    assert_eq!(reply["response"], "MEV is maximal extractable value.");
    assert_eq!(reply["structured_metadata"][0]["title"], "Flash Boys 2.0");
    assert_eq!(
        reply["structured_metadata"][0]["authors"],
        json!(["Philip Daian", "Steven Goldfeder"])
    );
    let job_id = reply["job_id"].as_str().unwrap_or_default().to_string();
    let session_id = reply["id"].as_str().unwrap_or_default().to_string();
    assert!(!job_id.is_empty());

    let (status, body) = gateway
        .request(
            Method::GET,
            &format!("/api/stream/{}", job_id),
            Some(&token),
            None,
        )
        .await?;
    assert_eq!(status, 200);
    let events = sse_payloads(&body);
    assert_eq!(events.len(), 2, "stream body: {}", body);
    assert_eq!(events[0]["content"], "partial answer");
    assert_eq!(events[0]["seq"], 1);
    assert_eq!(events[1]["seq"], 2);

    let (status, history) = gateway
        .request_json(
            Method::GET,
            &format!("/api/chat/history?id={}", session_id),
            Some(&token),
            None,
        )
        .await?;
    assert_eq!(status, 200);
    let roles: Vec<&str> = history
        .as_array()
        .map(|items| items.iter().filter_map(|m| m["role"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(roles, vec!["user", "assistant", "assistant"]);

    let (status, chats) = gateway
        .request_json(Method::GET, "/api/chats", Some(&token), None)
        .await?;
    assert_eq!(status, 200);
    assert_eq!(chats[0]["id"], session_id.as_str());
    assert_eq!(chats[0]["job_id"], job_id.as_str());
    assert_eq!(chats[0]["userId"], "alice");

    assert_eq!(backend.submissions(), vec!["What is MEV?"]);
    backend.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_requests_never_reach_the_backend() -> TestResult<()> {
    let Some((backend, gateway)) = start().await? else {
        return Ok(());
    };
    let token = gateway.issue_token("alice").await?;

    let (status, body) = gateway
        .request_json(
            Method::POST,
            "/api/chat",
            None,
            Some(r#"{"message":"What is MEV?","id":"s1"}"#),
        )
        .await?;
    assert_eq!(status, 401);
    assert!(body["error"].is_string());

    let (status, _) = gateway
        .request_json(
            Method::POST,
            "/api/chat",
            Some("mvc_00000000000000000000000000000000"),
            Some(r#"{"message":"What is MEV?","id":"s1"}"#),
        )
        .await?;
    assert_eq!(status, 401);

    let (status, _) = gateway
        .request_json(Method::POST, "/api/chat", Some(&token), Some("{oops"))
        .await?;
    assert_eq!(status, 400);

    let (status, _) = gateway
        .request_json(Method::POST, "/api/chat", None, Some("{oops"))
        .await?;
    assert_eq!(status, 400);

    let (status, chats) = gateway
        .request_json(Method::GET, "/api/chats", Some(&token), None)
        .await?;
    assert_eq!(status, 200);
    assert_eq!(chats, json!([]));
    assert!(backend.submissions().is_empty());

    backend.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_failures_surface_with_status() -> TestResult<()> {
    let Some((backend, gateway)) = start().await? else {
        return Ok(());
    };
    let token = gateway.issue_token("alice").await?;

    let (status, body) = gateway
        .request_json(Method::POST, "/api/chat", Some(&token), Some(r#"{"message":"FAIL"}"#))
        .await?;
    assert_eq!(status, 503);
    assert!(body["error"].as_str().unwrap_or_default().contains("503"));

    let (status, _) = gateway
        .request_json(Method::POST, "/api/chat", Some(&token), Some(r#"{"message":"NO_JOB"}"#))
        .await?;
    assert_eq!(status, 502);

    let (status, body) = gateway
        .request_json(
            Method::POST,
            "/api/chat",
            Some(&token),
            Some(r#"{"message":"BAD_METADATA"}"#),
        )
        .await?;
    assert_eq!(status, 200);
    assert_eq!(body["structured_metadata"], json!([]));

    backend.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sessions_are_private_to_their_owner() -> TestResult<()> {
    let Some((backend, gateway)) = start().await? else {
        return Ok(());
    };
    let alice = gateway.issue_token("alice").await?;
    let bob = gateway.issue_token("bob").await?;

    let (_, reply) = gateway
        .request_json(Method::POST, "/api/chat", Some(&alice), Some(r#"{"message":"hi"}"#))
        .await?;
    let job_id = reply["job_id"].as_str().unwrap_or_default().to_string();
    let session_id = reply["id"].as_str().unwrap_or_default().to_string();

    let (status, _) = gateway
        .request(Method::GET, &format!("/api/stream/{}", job_id), Some(&bob), None)
        .await?;
    assert_eq!(status, 404);

    let (status, _) = gateway
        .request(
            Method::GET,
            &format!("/api/chat/history?id={}", session_id),
            Some(&bob),
            None,
        )
        .await?;
    assert_eq!(status, 404);

    let body = format!(r#"{{"message":"hijack","id":"{}"}}"#, session_id);
    let (status, _) = gateway
        .request(Method::POST, "/api/chat", Some(&bob), Some(&body))
        .await?;
    assert_eq!(status, 401);

    backend.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_ask_follows_the_stream() -> TestResult<()> {
    let Some((backend, gateway)) = start().await? else {
        return Ok(());
    };
    let token = gateway.issue_token("alice").await?;
    gateway.run_cli(&["login", "--token", &token]).await?;

    let out = gateway
        .run_cli(&["ask", "--prompt", "What is MEV?"])
        .await?;
    assert!(out.contains("partial answer"), "ask output: {}", out);
    assert!(out.contains("full answer for job-1"), "ask output: {}", out);
    assert!(out.contains("Flash Boys 2.0"), "ask output: {}", out);

    let chats = gateway.run_cli(&["chats"]).await?;
    assert!(chats.contains("What is MEV?"), "chats output: {}", chats);

    gateway.run_cli(&["logout"]).await?;
    let out = gateway.run_cli(&["chats"]).await?;
    assert!(!out.contains("What is MEV?"));

    let out = gateway.run_cli(&["suggest", "--count", "3"]).await?;
    assert_eq!(out.matches('→').count(), 3, "suggest output: {}", out);
    let out = gateway.run_cli(&["ask"]).await?;
    assert!(out.contains("Try asking"), "ask output: {}", out);

    backend.shutdown().await;
    Ok(())
}
