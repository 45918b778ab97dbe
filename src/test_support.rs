//! Scripted backend used by unit tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::translate::{
    CacheStats, HealthResponse, HtmlTranslationResponse, InfoResponse, TextTranslationResponse,
    TranslateError, TranslateRequest, TranslationBackend,
};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: &'static str,
    pub base_url: String,
    pub request: Option<TranslateRequest>,
}

/// Returns canned responses after an optional delay; honours cancellation.
pub struct ScriptedBackend {
    pub text: Mutex<Result<Vec<String>, TranslateError>>,
    pub html: Mutex<Result<String, TranslateError>>,
    pub health: Mutex<Result<HealthResponse, TranslateError>>,
    pub info: Mutex<Result<InfoResponse, TranslateError>>,
    pub delay: Mutex<Duration>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            text: Mutex::new(Ok(vec!["hej".to_string()])),
            html: Mutex::new(Ok("<p>hej</p>".to_string())),
            health: Mutex::new(Ok(ready_health())),
            info: Mutex::new(Ok(sample_info())),
            delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.endpoint == endpoint).count()
    }

    async fn respond<T>(
        &self,
        endpoint: &'static str,
        base_url: &str,
        request: Option<&TranslateRequest>,
        cancel: &CancellationToken,
        result: Result<T, TranslateError>,
    ) -> Result<T, TranslateError> {
        self.calls.lock().push(RecordedCall {
            endpoint,
            base_url: base_url.to_string(),
            request: request.cloned(),
        });
        let delay = *self.delay.lock();
        tokio::select! {
            _ = tokio::time::sleep(delay) => result,
            _ = cancel.cancelled() => Err(TranslateError::Cancelled),
        }
    }
}

pub fn ready_health() -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        model_loaded: true,
        ready_for_translation: Some(true),
        last_error: None,
    }
}

pub fn sample_info() -> InfoResponse {
    InfoResponse {
        cache: Some(CacheStats {
            hit_rate: Some("50.0%".to_string()),
            hits: 10,
            currsize: 4,
        }),
        uptime: Some("1h 2m".to_string()),
    }
}

#[async_trait]
impl TranslationBackend for ScriptedBackend {
    async fn translate_text(
        &self,
        base_url: &str,
        request: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<TextTranslationResponse, TranslateError> {
        let result = self
            .text
            .lock()
            .clone()
            .map(|translations| TextTranslationResponse { translations });
        self.respond("translate", base_url, Some(request), cancel, result)
            .await
    }

    async fn translate_html(
        &self,
        base_url: &str,
        request: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<HtmlTranslationResponse, TranslateError> {
        let result = self
            .html
            .lock()
            .clone()
            .map(|html| HtmlTranslationResponse { html });
        self.respond("translate/html", base_url, Some(request), cancel, result)
            .await
    }

    async fn health(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<HealthResponse, TranslateError> {
        let result = self.health.lock().clone();
        self.respond("health", base_url, None, cancel, result).await
    }

    async fn info(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<InfoResponse, TranslateError> {
        let result = self.info.lock().clone();
        self.respond("info", base_url, None, cancel, result).await
    }
}
