//! HTTP adapter for the translation backend.
//! One pooled reqwest client; every call races the caller's cancellation
//! token. No retries: a failure is final for that user action.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    HealthResponse, HtmlTranslationResponse, InfoResponse, TextTranslationResponse,
    TranslateError, TranslateRequest, TranslationBackend,
};

/// reqwest-based backend client.
pub struct HttpBackend {
    http: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpBackend {
    /// Overall request deadlines are enforced by the caller; only connection
    /// setup is bounded here.
    pub fn new(connect_timeout: Duration) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TranslateError::Network(e.to_string()))?;
        Ok(Self {
            http,
            connect_timeout,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        cancel: &CancellationToken,
    ) -> Result<T, TranslateError> {
        let request = self.http.get(&url);
        self.execute(request, &url, cancel).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: String,
        body: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<T, TranslateError> {
        let request = self.http.post(&url).json(body);
        self.execute(request, &url, cancel).await
    }

    /// Send, check status, decode. Dropping the in-flight future on
    /// cancellation aborts the underlying connection.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, TranslateError> {
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| self.map_transport_error(e))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.bytes().await.unwrap_or_default();
                let message = error_message(status.as_u16(), &body);
                warn!(url, status = status.as_u16(), %message, "backend error response");
                return Err(TranslateError::Backend {
                    status: Some(status.as_u16()),
                    message,
                });
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| self.map_transport_error(e))?;
            serde_json::from_slice::<T>(&bytes).map_err(|e| TranslateError::Backend {
                status: Some(status.as_u16()),
                message: format!("malformed response from backend: {e}"),
            })
        };

        tokio::select! {
            result = exchange => result,
            _ = cancel.cancelled() => {
                debug!(url, "request aborted");
                Err(TranslateError::Cancelled)
            }
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> TranslateError {
        transport_error(e.is_timeout(), self.connect_timeout, &e)
    }
}

/// Transport failures are always `Network`. The only timeout configured on
/// the client is the connect bound; the request deadline belongs to the
/// caller and is reported as `Timeout` there.
fn transport_error(
    timed_out: bool,
    connect_timeout: Duration,
    detail: &dyn std::fmt::Display,
) -> TranslateError {
    if timed_out {
        TranslateError::Network(format!(
            "could not connect within {}s: {detail}",
            connect_timeout.as_secs()
        ))
    } else {
        TranslateError::Network(detail.to_string())
    }
}

#[async_trait]
impl TranslationBackend for HttpBackend {
    async fn translate_text(
        &self,
        base_url: &str,
        request: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<TextTranslationResponse, TranslateError> {
        self.post_json(endpoint(base_url, "/translate"), request, cancel)
            .await
    }

    async fn translate_html(
        &self,
        base_url: &str,
        request: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<HtmlTranslationResponse, TranslateError> {
        self.post_json(endpoint(base_url, "/translate/html"), request, cancel)
            .await
    }

    async fn health(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<HealthResponse, TranslateError> {
        self.get_json(endpoint(base_url, "/health"), cancel).await
    }

    async fn info(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<InfoResponse, TranslateError> {
        self.get_json(endpoint(base_url, "/info"), cancel).await
    }
}

/// Join the configured base URL and an endpoint path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim().trim_end_matches('/'), path)
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Human-readable message from a non-2xx body: the `detail` string, the
/// joined `msg` fields of a validation-error list, or a generic fallback.
pub fn error_message(status: u16, body: &[u8]) -> String {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    let message = match detail {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    };

    message.unwrap_or_else(|| format!("translation request failed (HTTP {status})"))
}
