//! Traductor: client for an ES⇄DA translation backend.
//! Library root: tracing setup and the `AppContext` that wires settings,
//! translation orchestration, UI state and the health poller together.

pub mod cancellation;
pub mod config;
pub mod health;
pub mod interchange;
pub mod metrics;
pub mod preview;
pub mod settings;
pub mod state_machine;
pub mod storage;
pub mod translate;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cancellation::TaskGeneration;
use config::{ClientConfig, ConfigError};
use health::HealthMonitor;
use metrics::{MetricsRegistry, RequestIds};
use settings::SettingsStore;
use state_machine::{StateMachine, UiEvent};
use storage::{LocalStorage, MemoryStorage, SqliteStorage, StorageError};
use translate::http::HttpBackend;
use translate::{TranslateError, TranslateResult, TranslationBackend, TranslationMode, TranslationService};

/// Install the global subscriber. Logs go to stderr; `RUST_LOG` wins over the
/// default filter.
pub fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("traductor=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("settings storage: {0}")]
    Storage(#[from] StorageError),
    #[error("http client: {0}")]
    Backend(#[from] TranslateError),
}

/// Held while a translation runs; if the future is dropped before it
/// settles, the UI returns to idle instead of staying `Translating`.
struct InFlightSlot<'a> {
    state_machine: &'a StateMachine,
    armed: bool,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            info!("translation dropped before completion");
            let _ = self.state_machine.dispatch(UiEvent::Cancelled);
        }
    }
}

/// Shared application state.
pub struct AppContext {
    pub settings: Arc<SettingsStore>,
    pub service: Arc<TranslationService>,
    pub state_machine: Arc<StateMachine>,
    pub health: Arc<HealthMonitor>,
    pub metrics: Arc<MetricsRegistry>,
    translations: TaskGeneration,
}

impl AppContext {
    /// Wire up with the HTTP backend and the storage `config` selects.
    pub fn from_config(config: &ClientConfig) -> Result<Self, StartupError> {
        let storage: Arc<dyn LocalStorage> = if config.ephemeral {
            Arc::new(MemoryStorage::new())
        } else {
            let path = config.storage_path()?;
            info!(path = %path.display(), "opening settings storage");
            Arc::new(SqliteStorage::open(&path)?)
        };
        let backend = Arc::new(HttpBackend::new(config.probe_timeout)?);
        Ok(Self::new(backend, storage, config))
    }

    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        storage: Arc<dyn LocalStorage>,
        config: &ClientConfig,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let settings = Arc::new(SettingsStore::load(storage));
        let service = Arc::new(TranslationService::new(
            Arc::clone(&backend),
            Arc::clone(&metrics),
            config.translate_timeout,
            config.empty_input,
        ));
        let health = Arc::new(HealthMonitor::new(
            backend,
            Arc::clone(&settings),
            Arc::clone(&metrics),
            config.probe_timeout,
            config.poll_interval,
        ));
        Self {
            settings,
            service,
            state_machine: Arc::new(StateMachine::new()),
            health,
            metrics,
            translations: TaskGeneration::new(),
        }
    }

    /// Translate `input` with the current settings and publish the outcome
    /// to the UI state. Fails with `InFlight` while another translation runs.
    pub async fn translate(
        &self,
        input: &str,
        mode: TranslationMode,
    ) -> Result<TranslateResult, TranslateError> {
        self.state_machine.begin(mode)?;
        let mut in_flight = InFlightSlot {
            state_machine: &self.state_machine,
            armed: true,
        };
        let guard = self.translations.cancel_and_advance();
        let ids = RequestIds::new(guard.my_generation());
        let settings = self.settings.snapshot();

        let outcome = self
            .service
            .translate(&settings, input, mode, &ids, guard.token())
            .await;

        in_flight.armed = false;
        let event = match &outcome {
            Ok(result) => UiEvent::Completed(result.clone()),
            Err(TranslateError::Cancelled) => UiEvent::Cancelled,
            Err(e) => UiEvent::Failed(e.clone()),
        };
        // dispatch logs rejected transitions itself
        let _ = self.state_machine.dispatch(event);
        outcome
    }

    /// Abort the running translation, if any.
    pub fn cancel_translation(&self) {
        self.translations.cancel_all();
    }

    /// Start the background health poller.
    pub fn start_health_poller(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.health).spawn(shutdown)
    }
}
