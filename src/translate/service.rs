//! Translation request orchestration.
//! Validates input, builds the request from the current settings, runs it
//! against the backend under a deadline and measures latency.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    TranslateError, TranslateRequest, TranslateResult, TranslationBackend, TranslationMode,
    SEGMENT_SEPARATOR,
};
use crate::cancellation::run_with_deadline;
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};
use crate::settings::Settings;

/// Which inputs count as empty and are rejected before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyInputPolicy {
    /// Whitespace-only input is empty.
    Trimmed,
    /// Only `""` is empty; whitespace and newlines are sent as typed.
    ZeroLength,
}

impl Default for EmptyInputPolicy {
    fn default() -> Self {
        EmptyInputPolicy::Trimmed
    }
}

impl EmptyInputPolicy {
    pub fn rejects(self, input: &str) -> bool {
        match self {
            EmptyInputPolicy::Trimmed => input.trim().is_empty(),
            EmptyInputPolicy::ZeroLength => input.is_empty(),
        }
    }
}

impl fmt::Display for EmptyInputPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyInputPolicy::Trimmed => f.write_str("trimmed"),
            EmptyInputPolicy::ZeroLength => f.write_str("zero-length"),
        }
    }
}

impl FromStr for EmptyInputPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trimmed" | "trim" => Ok(EmptyInputPolicy::Trimmed),
            "zero-length" | "zero_length" | "strict" => Ok(EmptyInputPolicy::ZeroLength),
            other => Err(format!("unknown empty-input policy: {other}")),
        }
    }
}

/// Orchestrates one translation per call. Does not serialize callers: at
/// most one call per surface should be in flight (see `AppContext`).
pub struct TranslationService {
    backend: Arc<dyn TranslationBackend>,
    metrics: Arc<MetricsRegistry>,
    timeout: Duration,
    empty_input: EmptyInputPolicy,
}

impl TranslationService {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        metrics: Arc<MetricsRegistry>,
        timeout: Duration,
        empty_input: EmptyInputPolicy,
    ) -> Self {
        Self {
            backend,
            metrics,
            timeout,
            empty_input,
        }
    }

    /// Translate `input` with `settings`. `cancel` aborts the call; the
    /// deadline fires it too, yielding `Timeout`.
    pub async fn translate(
        &self,
        settings: &Settings,
        input: &str,
        mode: TranslationMode,
        ids: &RequestIds,
        cancel: &CancellationToken,
    ) -> Result<TranslateResult, TranslateError> {
        if self.empty_input.rejects(input) {
            return Err(TranslateError::EmptyInput);
        }

        let request = TranslateRequest::build(settings, input, mode);
        info!(
            request_id = %ids.request_id,
            mode = ?mode,
            direction = %request.direction,
            chars = input.chars().count(),
            glossary_terms = request.glossary.as_ref().map_or(0, |g| g.len()),
            max_new_tokens = ?request.max_new_tokens,
            "translate_start"
        );

        let base_url = settings.backend_url.as_str();
        let metric = match mode {
            TranslationMode::Text => metric_names::TRANSLATE_TEXT,
            TranslationMode::Html => metric_names::TRANSLATE_HTML,
        };
        let span = self.metrics.span(metric);

        let exchange = async {
            match mode {
                TranslationMode::Text => self
                    .backend
                    .translate_text(base_url, &request, cancel)
                    .await
                    .map(|r| r.translations.join(SEGMENT_SEPARATOR)),
                TranslationMode::Html => self
                    .backend
                    .translate_html(base_url, &request, cancel)
                    .await
                    .map(|r| r.html),
            }
        };

        match run_with_deadline(self.timeout, cancel, exchange).await {
            Ok(output) => {
                let latency_ms = span.finish();
                info!(
                    request_id = %ids.request_id,
                    latency_ms,
                    output_chars = output.chars().count(),
                    "translate_done"
                );
                Ok(TranslateResult {
                    request_id: ids.request_id.clone(),
                    mode,
                    direction: request.direction,
                    output,
                    latency_ms,
                })
            }
            Err(e) => {
                warn!(request_id = %ids.request_id, kind = e.kind(), error = %e, "translate_failed");
                Err(e)
            }
        }
    }
}
