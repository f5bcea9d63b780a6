//! HTTP "ping" executor.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use tickrun_core::{TaskDefinition, TaskKind};

use super::{parse_payload, Execution, Executor, ExecutorError};

/// Response bodies longer than this are cut in the captured output.
const MAX_CAPTURED_BODY: usize = 4096;

fn default_method() -> String {
    "GET".to_string()
}

/// Payload of a `ping` task.
#[derive(Debug, Deserialize)]
struct PingPayload {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Sends an HTTP request; any 2xx response is a success.
#[derive(Debug, Clone)]
pub struct PingExecutor {
    client: reqwest::Client,
}

impl PingExecutor {
    /// Create a new executor with a default client.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a new executor around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for PingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for PingExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::from(TaskKind::PING)
    }

    async fn execute(&self, task: &TaskDefinition) -> Result<Execution, ExecutorError> {
        let payload: PingPayload = parse_payload(task)?;
        let method = reqwest::Method::from_bytes(payload.method.to_uppercase().as_bytes())
            .map_err(|_| {
                ExecutorError::InvalidPayload(format!("invalid HTTP method '{}'", payload.method))
            })?;

        let mut request = self.client.request(method.clone(), &payload.url);
        for (key, value) in &payload.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = payload.body {
            request = request.body(body);
        }
        // Fallback for unbounded tasks; an explicit task timeout is enforced by the registry.
        if task.timeout.is_none() {
            request = request.timeout(Duration::from_secs(30));
        }

        info!(task_id = %task.id, method = %method, url = %payload.url, "Pinging");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let output = captured_body(body);

        if status.is_success() {
            Ok(Execution::Succeeded { output })
        } else {
            Ok(Execution::Failed {
                description: format!("HTTP {} from {}", status, payload.url),
                output,
            })
        }
    }
}

fn captured_body(body: String) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    if body.len() <= MAX_CAPTURED_BODY {
        return Some(body);
    }
    let mut end = MAX_CAPTURED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    Some(format!("{}... [truncated]", &body[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 4\r\nconnection: close\r\n\r\npong",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/health", addr)
    }

    fn ping_task(url: &str) -> TaskDefinition {
        TaskDefinition::cron("ping", TaskKind::PING, "* * * * *")
            .unwrap()
            .with_payload(json!({ "url": url }))
    }

    #[tokio::test]
    async fn test_ping_success() {
        let url = serve_once("200 OK").await;
        let execution = PingExecutor::new().execute(&ping_task(&url)).await.unwrap();
        assert_eq!(
            execution,
            Execution::Succeeded {
                output: Some("pong".into())
            }
        );
    }

    #[tokio::test]
    async fn test_ping_error_status_is_failure() {
        let url = serve_once("503 Service Unavailable").await;
        let execution = PingExecutor::new().execute(&ping_task(&url)).await.unwrap();
        match execution {
            Execution::Failed { description, .. } => assert!(description.starts_with("HTTP 503")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let task = ping_task("http://127.0.0.1:1/").with_payload(json!({
            "url": "http://127.0.0.1:1/",
            "method": "NOT A METHOD",
        }));
        let err = PingExecutor::new().execute(&task).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidPayload(_)));
    }

    #[test]
    fn test_captured_body_truncates() {
        assert_eq!(captured_body("  ".into()), None);
        let long = "x".repeat(MAX_CAPTURED_BODY + 10);
        let captured = captured_body(long).unwrap();
        assert!(captured.ends_with("[truncated]"));
    }
}
