//! User settings: data model, pure transitions, persisted schema and store.
//!
//! Settings are loaded once at startup from a single local-storage entry,
//! migrated from legacy shapes if needed, and then overwritten wholesale after
//! every mutation. Persistence failures are logged and never reach callers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::storage::LocalStorage;

/// Name of the local-storage entry holding the settings blob.
pub const STORAGE_KEY: &str = "traductor-es-da-config";
/// Current persisted schema version.
pub const SCHEMA_VERSION: u64 = 2;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const MIN_NEW_TOKENS: u32 = 32;
pub const MAX_NEW_TOKENS: u32 = 512;
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 256;
/// Token budget shipped as the default by v1 clients; treated as stale.
pub const LEGACY_MAX_NEW_TOKENS: i64 = 192;

/// Which language is source and which is target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "es-da")]
    EsDa,
    #[serde(rename = "da-es")]
    DaEs,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::EsDa => "es-da",
            Direction::DaEs => "da-es",
        }
    }

    /// Formal register (De/Dem) only exists on the Danish output side.
    pub fn supports_formal(self) -> bool {
        self == Direction::EsDa
    }

}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "es-da" => Ok(Direction::EsDa),
            "da-es" => Ok(Direction::DaEs),
            other => Err(SettingsError::InvalidValue {
                field: "direction",
                value: other.to_string(),
            }),
        }
    }
}

/// Who decides the output token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    /// Computed server-side; nothing is sent.
    Auto,
    /// Client supplies `max_new_tokens` and `strict_max`.
    Manual,
}

impl fmt::Display for TokenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenMode::Auto => f.write_str("auto"),
            TokenMode::Manual => f.write_str("manual"),
        }
    }
}

impl FromStr for TokenMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TokenMode::Auto),
            "manual" => Ok(TokenMode::Manual),
            other => Err(SettingsError::InvalidValue {
                field: "tokenMode",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown settings field: {0}")]
    UnknownField(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Clamp any requested budget into `[MIN_NEW_TOKENS, MAX_NEW_TOKENS]`.
pub fn clamp_max_new_tokens(value: i64) -> u32 {
    value.clamp(MIN_NEW_TOKENS as i64, MAX_NEW_TOKENS as i64) as u32
}

/// Integer text, saturating past the `i64` range; finite decimals truncate.
fn parse_token_count(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
    })
}

/// Trim whitespace and trailing slashes; blank input falls back to the default.
pub fn normalize_backend_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BACKEND_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Client-side configuration chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub backend_url: String,
    pub direction: Direction,
    pub formal: bool,
    pub token_mode: TokenMode,
    #[serde(deserialize_with = "deserialize_token_budget")]
    pub max_new_tokens: u32,
    pub strict_max: bool,
    pub glossary_text: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            direction: Direction::EsDa,
            formal: false,
            token_mode: TokenMode::Auto,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            strict_max: false,
            glossary_text: String::new(),
        }
    }
}

/// Explicit token budget sent to the backend in manual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_new_tokens: u32,
    pub strict_max: bool,
}

/// A single settings mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    BackendUrl(String),
    Direction(Direction),
    Formal(bool),
    TokenMode(TokenMode),
    /// Any integer; clamped on apply.
    MaxNewTokens(i64),
    StrictMax(bool),
    GlossaryText(String),
}

impl SettingsUpdate {
    /// Parse a `field value` pair as typed on the command line.
    pub fn parse(field: &str, value: &str) -> Result<Self, SettingsError> {
        let invalid = |field: &'static str| SettingsError::InvalidValue {
            field,
            value: value.to_string(),
        };
        match field {
            "backendUrl" | "backend-url" | "backend_url" | "url" => {
                Ok(SettingsUpdate::BackendUrl(value.to_string()))
            }
            "direction" => Ok(SettingsUpdate::Direction(value.parse()?)),
            "formal" => parse_bool(value)
                .map(SettingsUpdate::Formal)
                .ok_or_else(|| invalid("formal")),
            "tokenMode" | "token-mode" | "token_mode" => {
                Ok(SettingsUpdate::TokenMode(value.parse()?))
            }
            "maxNewTokens" | "max-new-tokens" | "max_new_tokens" => parse_token_count(value)
                .map(SettingsUpdate::MaxNewTokens)
                .ok_or_else(|| invalid("maxNewTokens")),
            "strictMax" | "strict-max" | "strict_max" => parse_bool(value)
                .map(SettingsUpdate::StrictMax)
                .ok_or_else(|| invalid("strictMax")),
            "glossaryText" | "glossary-text" | "glossary_text" => {
                Ok(SettingsUpdate::GlossaryText(value.to_string()))
            }
            other => Err(SettingsError::UnknownField(other.to_string())),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Settings {
    /// Pure transition: returns the settings with `update` applied.
    pub fn apply(mut self, update: SettingsUpdate) -> Settings {
        match update {
            SettingsUpdate::BackendUrl(url) => self.backend_url = normalize_backend_url(&url),
            SettingsUpdate::Direction(direction) => self.direction = direction,
            SettingsUpdate::Formal(formal) => self.formal = formal,
            SettingsUpdate::TokenMode(mode) => self.token_mode = mode,
            SettingsUpdate::MaxNewTokens(tokens) => {
                self.max_new_tokens = clamp_max_new_tokens(tokens)
            }
            SettingsUpdate::StrictMax(strict) => self.strict_max = strict,
            SettingsUpdate::GlossaryText(text) => self.glossary_text = text,
        }
        self
    }

    /// Formal flag as it must be transmitted for the current direction.
    pub fn effective_formal(&self) -> bool {
        self.formal && self.direction.supports_formal()
    }

    /// Budget to transmit; `None` in auto mode.
    pub fn token_budget(&self) -> Option<TokenBudget> {
        match self.token_mode {
            TokenMode::Auto => None,
            TokenMode::Manual => Some(TokenBudget {
                max_new_tokens: clamp_max_new_tokens(self.max_new_tokens as i64),
                strict_max: self.strict_max,
            }),
        }
    }
}

/// Accepts numbers (any sign/magnitude, or float) and numeric strings.
fn deserialize_token_budget<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = Value::deserialize(deserializer)?;
    let parsed = match &raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_token_count(s),
        _ => None,
    };
    parsed
        .map(clamp_max_new_tokens)
        .ok_or_else(|| D::Error::custom(format!("invalid maxNewTokens: {raw}")))
}

// --- Persisted schema ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings<'a> {
    schema_version: u64,
    #[serde(flatten)]
    settings: &'a Settings,
}

/// Serialize settings into the current persisted schema.
pub fn to_stored_json(settings: &Settings) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StoredSettings {
        schema_version: SCHEMA_VERSION,
        settings,
    })
}

type Migration = fn(&mut Map<String, Value>) -> bool;

/// Applied in order; each detects its legacy shape and reports whether it changed the blob.
const MIGRATIONS: &[(&str, Migration)] = &[
    ("rename_legacy_fields", rename_legacy_fields),
    ("reset_token_budget", reset_token_budget),
    ("stamp_version", stamp_version),
];

fn schema_version(blob: &Map<String, Value>) -> u64 {
    blob.get("schemaVersion").and_then(Value::as_u64).unwrap_or(1)
}

/// Field names written by the standalone script UI.
fn rename_legacy_fields(blob: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    for (legacy, current) in [
        ("apiUrl", "backendUrl"),
        ("maxTokens", "maxNewTokens"),
        ("glossary", "glossaryText"),
    ] {
        if let Some(value) = blob.remove(legacy) {
            changed = true;
            if !blob.contains_key(current) && !value.is_null() {
                blob.insert(current.to_string(), value);
            }
        }
    }
    changed
}

/// Missing token mode, or the stale v1 default budget, resets token fields.
fn reset_token_budget(blob: &mut Map<String, Value>) -> bool {
    let missing_mode = !blob.contains_key("tokenMode");
    let stale_budget = schema_version(blob) < SCHEMA_VERSION
        && blob.get("maxNewTokens").and_then(stored_i64) == Some(LEGACY_MAX_NEW_TOKENS);
    if !(missing_mode || stale_budget) {
        return false;
    }
    blob.insert("tokenMode".into(), Value::from(TokenMode::Auto.to_string()));
    blob.insert("maxNewTokens".into(), Value::from(DEFAULT_MAX_NEW_TOKENS));
    blob.insert("strictMax".into(), Value::from(false));
    true
}

fn stamp_version(blob: &mut Map<String, Value>) -> bool {
    if schema_version(blob) == SCHEMA_VERSION && blob.contains_key("schemaVersion") {
        return false;
    }
    blob.insert("schemaVersion".into(), Value::from(SCHEMA_VERSION));
    true
}

fn stored_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// How the settings of this session came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Nothing stored yet.
    Defaults,
    Stored,
    /// Stored blob needed these migrations; re-persisted.
    Migrated(Vec<&'static str>),
    /// Stored blob unreadable; defaults used.
    Corrupt(String),
}

/// Decode a stored blob, applying migrations. Returns the settings and the
/// names of the migrations that changed something.
pub fn decode_stored(raw: &str) -> Result<(Settings, Vec<&'static str>), String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let Value::Object(mut blob) = value else {
        return Err("settings blob is not a JSON object".to_string());
    };

    let applied: Vec<&'static str> = MIGRATIONS
        .iter()
        .filter_map(|(name, migrate)| migrate(&mut blob).then_some(*name))
        .collect();

    let settings: Settings =
        serde_json::from_value(Value::Object(blob)).map_err(|e| e.to_string())?;
    Ok((settings, applied))
}

/// Owns the in-memory settings, persists after every mutation and notifies
/// subscribers.
pub struct SettingsStore {
    storage: Arc<dyn LocalStorage>,
    key: String,
    current: RwLock<Settings>,
    settings_tx: watch::Sender<Settings>,
    settings_rx: watch::Receiver<Settings>,
    source: LoadSource,
}

impl SettingsStore {
    /// Load from `storage` under the default key.
    pub fn load(storage: Arc<dyn LocalStorage>) -> Self {
        Self::load_with_key(storage, STORAGE_KEY)
    }

    pub fn load_with_key(storage: Arc<dyn LocalStorage>, key: &str) -> Self {
        let (settings, source) = match storage.get_item(key) {
            Ok(None) => (Settings::default(), LoadSource::Defaults),
            Ok(Some(raw)) => match decode_stored(&raw) {
                Ok((settings, applied)) if applied.is_empty() => (settings, LoadSource::Stored),
                Ok((settings, applied)) => (settings, LoadSource::Migrated(applied)),
                Err(e) => {
                    warn!(error = %e, key, "stored settings unreadable, using defaults");
                    (Settings::default(), LoadSource::Corrupt(e))
                }
            },
            Err(e) => {
                warn!(error = %e, key, "settings read failed, using defaults");
                (Settings::default(), LoadSource::Corrupt(e.to_string()))
            }
        };

        let (settings_tx, settings_rx) = watch::channel(settings.clone());
        let store = Self {
            storage,
            key: key.to_string(),
            current: RwLock::new(settings),
            settings_tx,
            settings_rx,
            source,
        };

        if let LoadSource::Migrated(ref applied) = store.source {
            info!(migrations = ?applied, "settings migrated");
            store.persist(&store.current.read());
        }
        debug!(source = ?store.source, "settings loaded");
        store
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    /// Current settings (cloned).
    pub fn snapshot(&self) -> Settings {
        self.current.read().clone()
    }

    /// Subscribe to settings changes.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.settings_rx.clone()
    }

    /// Apply one mutation, persist, notify. Returns the new settings.
    pub fn update(&self, update: SettingsUpdate) -> Settings {
        let mut current = self.current.write();
        let next = current.clone().apply(update);
        *current = next.clone();
        self.persist(&next);
        self.settings_tx.send_replace(next.clone());
        next
    }

    /// Restore defaults and persist.
    pub fn reset(&self) -> Settings {
        let mut current = self.current.write();
        *current = Settings::default();
        self.persist(&current);
        self.settings_tx.send_replace(current.clone());
        info!("settings reset to defaults");
        current.clone()
    }

    /// Write the whole blob. Failures are logged only.
    fn persist(&self, settings: &Settings) {
        let result = to_stored_json(settings)
            .map_err(crate::storage::StorageError::from)
            .and_then(|json| self.storage.set_item(&self.key, &json));
        match result {
            Ok(()) => debug!(key = %self.key, "settings_persisted"),
            Err(e) => warn!(error = %e, key = %self.key, "settings persist failed"),
        }
    }
}
