//! Translation requests against the remote backend.
//! Wire types, error kinds and the backend adapter trait live here; the HTTP
//! adapter is in `http`, request orchestration in `service`.

pub mod glossary;
pub mod http;
pub mod service;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use crate::settings::{Direction, Settings};
use glossary::Glossary;

pub use service::{EmptyInputPolicy, TranslationService};

/// What kind of payload is being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    Text,
    Html,
}

impl TranslationMode {
    pub fn file_extension(self) -> &'static str {
        match self {
            TranslationMode::Text => "txt",
            TranslationMode::Html => "html",
        }
    }
}

/// Body of `POST /translate` and `POST /translate/html`. Built once, sent once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub direction: Direction,
    pub formal: bool,
    pub glossary: Option<Glossary>,
    pub preserve_newlines: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_max: Option<bool>,
}

impl TranslateRequest {
    /// Build the request for `input` from the current settings.
    /// The input is carried verbatim.
    pub fn build(settings: &Settings, input: &str, mode: TranslationMode) -> Self {
        let budget = settings.token_budget();
        let (text, html) = match mode {
            TranslationMode::Text => (Some(input.to_string()), None),
            TranslationMode::Html => (None, Some(input.to_string())),
        };
        Self {
            text,
            html,
            direction: settings.direction,
            formal: settings.effective_formal(),
            glossary: glossary::parse_glossary(&settings.glossary_text),
            preserve_newlines: true,
            max_new_tokens: budget.map(|b| b.max_new_tokens),
            strict_max: budget.map(|b| b.strict_max),
        }
    }
}

/// `POST /translate` success body.
#[derive(Debug, Clone, Deserialize)]
pub struct TextTranslationResponse {
    pub translations: Vec<String>,
}

/// `POST /translate/html` success body.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlTranslationResponse {
    pub html: String,
}

/// Segments are joined with a blank line for display.
pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// Outcome of one translation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslateResult {
    pub request_id: String,
    pub mode: TranslationMode,
    pub direction: Direction,
    pub output: String,
    pub latency_ms: u64,
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub ready_for_translation: Option<bool>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Cache counters reported by `GET /info`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheStats {
    #[serde(default, deserialize_with = "lenient_string")]
    pub hit_rate: Option<String>,
    #[serde(default)]
    pub hits: u64,
    #[serde(default)]
    pub currsize: u64,
}

/// `GET /info` body; everything optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InfoResponse {
    #[serde(default)]
    pub cache: Option<CacheStats>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uptime: Option<String>,
}

/// Strings pass through; numbers are rendered; anything else is absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("input is empty")]
    EmptyInput,
    #[error("a translation is already in progress")]
    InFlight,
    #[error("translation timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("translation cancelled")]
    Cancelled,
    #[error("{message}")]
    Backend { status: Option<u16>, message: String },
    #[error("network error: {0}")]
    Network(String),
}

impl TranslateError {
    /// Short machine-friendly kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslateError::EmptyInput => "empty_input",
            TranslateError::InFlight => "in_flight",
            TranslateError::Timeout { .. } => "timeout",
            TranslateError::Cancelled => "cancelled",
            TranslateError::Backend { .. } => "backend",
            TranslateError::Network(_) => "network",
        }
    }
}

/// Adapter for a translation backend. Every call observes `cancel` and
/// returns `TranslateError::Cancelled` once it fires.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate_text(
        &self,
        base_url: &str,
        request: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<TextTranslationResponse, TranslateError>;

    async fn translate_html(
        &self,
        base_url: &str,
        request: &TranslateRequest,
        cancel: &CancellationToken,
    ) -> Result<HtmlTranslationResponse, TranslateError>;

    async fn health(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<HealthResponse, TranslateError>;

    async fn info(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<InfoResponse, TranslateError>;
}
