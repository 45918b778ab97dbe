//! Minimal in-process HTTP responder standing in for the translation backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

#[derive(Clone)]
struct Reply {
    status: u16,
    body: String,
    delay: Duration,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    routes: Arc<Mutex<HashMap<String, Reply>>>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `path` with `status` and a JSON `body`.
    pub fn route(&self, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.route_delayed(path, status, body, Duration::ZERO)
    }

    pub fn route_delayed(
        &self,
        path: &str,
        status: u16,
        body: serde_json::Value,
        delay: Duration,
    ) -> &Self {
        self.routes.lock().insert(
            path.to_string(),
            Reply {
                status,
                body: body.to_string(),
                delay,
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<CapturedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Bind an ephemeral port and serve until the test ends.
    pub async fn serve(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let this = self.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let this = this.clone();
                tokio::spawn(async move {
                    let _ = this.handle(stream).await;
                });
            }
        });
        format!("http://{addr}")
    }

    async fn handle(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();
        let content_length = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
        self.captured.lock().push(CapturedRequest {
            method,
            path: path.clone(),
            body,
        });

        let reply = self.routes.lock().get(&path).cloned().unwrap_or(Reply {
            status: 404,
            body: r#"{"detail":"Not Found"}"#.to_string(),
            delay: Duration::ZERO,
        });
        tokio::time::sleep(reply.delay).await;
        let response = format!(
            "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            reply.status,
            reply.body.len(),
            reply.body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    }
}

pub fn healthy() -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "model_loaded": true,
        "ready_for_translation": true
    })
}

pub fn info() -> serde_json::Value {
    serde_json::json!({
        "cache": {"hit_rate": "75.0%", "hits": 3, "currsize": 2},
        "uptime": "0h 5m"
    })
}
