//! Smoke verification of a deployed endpoint
//!
//! One POST with a minimal chat payload; only an exact 200 counts as a pass.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::error::{DeployError, Result};

/// Transport-level failure: no HTTP status was received
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ProbeError(pub String);

/// Outcome of the single smoke request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeResult {
    pub status_code: u16,
    pub passed: bool,
}

impl SmokeResult {
    pub fn from_status(status_code: u16) -> Self {
        Self {
            status_code,
            passed: status_code == 200,
        }
    }
}

/// Sends the smoke request
#[async_trait]
pub trait SmokeProbe: Send + Sync {
    /// POST `body` as JSON and return the response status
    async fn post_json(&self, url: &str, body: &Value) -> std::result::Result<u16, ProbeError>;
}

/// Probe over real HTTP. Redirects are not followed so a 3xx is reported as-is.
pub struct HttpSmokeProbe {
    client: reqwest::Client,
}

impl HttpSmokeProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DeployError::General(e.into()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SmokeProbe for HttpSmokeProbe {
    async fn post_json(&self, url: &str, body: &Value) -> std::result::Result<u16, ProbeError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ProbeError(e.without_url().to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Request body of the smoke test
pub fn smoke_payload() -> Value {
    json!({
        "user_input": "Hello",
        "conversation_history": []
    })
}

/// `{function_url}?code={key}`, with the key percent-encoded
pub fn smoke_url(function_url: &str, key: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(function_url).map_err(|e| DeployError::SmokeUnreachable {
        url: function_url.to_string(),
        reason: format!("invalid function URL: {}", e),
    })?;
    url.query_pairs_mut().append_pair("code", key);
    Ok(url.into())
}

/// Send the smoke request; fails with the status for anything but 200, or with
/// an unreachable error when no response came back
pub async fn verify(probe: &dyn SmokeProbe, function_url: &str, key: &str) -> Result<SmokeResult> {
    let url = smoke_url(function_url, key)?;
    info!("Smoke testing {}", function_url);

    let status = probe
        .post_json(&url, &smoke_payload())
        .await
        .map_err(|e| DeployError::SmokeUnreachable {
            url: function_url.to_string(),
            reason: e.0,
        })?;

    let result = SmokeResult::from_status(status);
    if result.passed {
        info!("Smoke test passed ({})", status);
        Ok(result)
    } else {
        Err(DeployError::SmokeStatus(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, answer with `status_line`, return the raw request
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!("HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });

        (format!("http://{}/api/businessinsightbot_function", addr), handle)
    }

    #[test]
    fn test_smoke_url() {
        assert_eq!(
            smoke_url("https://app.azurewebsites.net/api/chat", "k3y").unwrap(),
            "https://app.azurewebsites.net/api/chat?code=k3y"
        );
        assert_eq!(
            smoke_url("https://app.azurewebsites.net/api/chat?v=1", "k").unwrap(),
            "https://app.azurewebsites.net/api/chat?v=1&code=k"
        );
    }

    #[test]
    fn test_smoke_url_encodes_key() {
        assert_eq!(
            smoke_url("https://app.azurewebsites.net/api/chat", "a+b&c==").unwrap(),
            "https://app.azurewebsites.net/api/chat?code=a%2Bb%26c%3D%3D"
        );
        assert!(matches!(
            smoke_url("not a url", "k"),
            Err(DeployError::SmokeUnreachable { .. })
        ));
    }

    #[test]
    fn test_only_200_passes() {
        assert!(SmokeResult::from_status(200).passed);
        for status in [201, 204, 301, 302, 400, 401, 404, 500, 503] {
            assert!(!SmokeResult::from_status(status).passed, "{}", status);
        }
    }

    #[tokio::test]
    async fn test_http_probe_sends_contract_request() {
        let (url, server) = one_shot_server("200 OK").await;
        let probe = HttpSmokeProbe::new(Duration::from_secs(5)).unwrap();

        let result = verify(&probe, &url, "abc123").await.unwrap();
        assert_eq!(result, SmokeResult { status_code: 200, passed: true });

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/businessinsightbot_function?code=abc123 HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        let body = request.split("\r\n\r\n").nth(1).unwrap();
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, json!({"user_input": "Hello", "conversation_history": []}));
    }

    #[tokio::test]
    async fn test_http_probe_reports_status() {
        let (url, server) = one_shot_server("503 Service Unavailable").await;
        let probe = HttpSmokeProbe::new(Duration::from_secs(5)).unwrap();

        let err = verify(&probe, &url, "abc123").await.unwrap_err();
        assert!(matches!(err, DeployError::SmokeStatus(503)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_redirect_is_a_failure() {
        let (url, server) = one_shot_server("302 Found").await;
        let probe = HttpSmokeProbe::new(Duration::from_secs(5)).unwrap();

        let err = verify(&probe, &url, "abc123").await.unwrap_err();
        assert!(matches!(err, DeployError::SmokeStatus(302)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpSmokeProbe::new(Duration::from_secs(5)).unwrap();
        let err = verify(&probe, &format!("http://{}/api/chat", addr), "TOPSECRETKEY")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::SmokeUnreachable { .. }));
        assert!(!err.to_string().contains("TOPSECRETKEY"), "{}", err);
    }
}
