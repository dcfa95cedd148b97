//! Tests against a real listener: graceful shutdown and the SSE transport.

mod common;

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use toolbox_server::{Server, ServerResult};

const WAIT: Duration = Duration::from_secs(10);

async fn start() -> (SocketAddr, CancellationToken, JoinHandle<ServerResult<()>>) {
    let server = Server::bind(common::registry().await, "127.0.0.1", 0)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    (addr, shutdown, handle)
}

/// Read SSE frames until one with the given event name arrives.
async fn next_event(response: &mut reqwest::Response, buffer: &mut String, event: &str) -> String {
    loop {
        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            let mut name = "message";
            let mut data = Vec::new();
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = value.trim();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.trim_start());
                }
            }
            // keep-alive comments carry no data
            if name == event && !data.is_empty() {
                return data.join("\n");
            }
        }
        let chunk = response.chunk().await.unwrap().expect("stream ended");
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

#[tokio::test]
async fn test_serves_and_shuts_down() {
    let (addr, shutdown, handle) = start().await;

    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Hello"));

    shutdown.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let (addr, shutdown, handle) = start().await;
    let err = Server::bind(common::registry().await, "127.0.0.1", addr.port())
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains(&addr.port().to_string()));
    shutdown.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_sse_session_round_trip() {
    let (addr, shutdown, handle) = start().await;
    let client = reqwest::Client::new();

    let mut stream = client
        .get(format!("http://{addr}/mcp/math/sse"))
        .send()
        .await
        .unwrap();
    assert!(stream.status().is_success());

    let mut buffer = String::new();
    let endpoint = timeout(WAIT, next_event(&mut stream, &mut buffer, "endpoint"))
        .await
        .unwrap();
    assert!(endpoint.starts_with("/mcp/math?sessionId="), "{endpoint}");

    let post = |body: Value| {
        client
            .post(format!("http://{addr}{endpoint}"))
            .json(&body)
            .send()
    };

    let accepted = post(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {"protocolVersion": "2024-11-05"}
    }))
    .await
    .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);
    let init: Value = serde_json::from_str(
        &timeout(WAIT, next_event(&mut stream, &mut buffer, "message"))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(init["id"], json!(1));
    assert_eq!(init["result"]["serverInfo"]["name"], json!("toolbox"));

    post(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await
        .unwrap();
    let list: Value = serde_json::from_str(
        &timeout(WAIT, next_event(&mut stream, &mut buffer, "message"))
            .await
            .unwrap(),
    )
    .unwrap();
    let tools = list["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], json!("add"));

    post(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {"name": "add", "arguments": {"a": 1, "b": 2}}
    }))
    .await
    .unwrap();
    let call: Value = serde_json::from_str(
        &timeout(WAIT, next_event(&mut stream, &mut buffer, "message"))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(call["result"]["content"][0]["text"], json!("[{\"total\":3}]"));

    // shutdown ends the open stream and lets the server drain
    shutdown.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}
