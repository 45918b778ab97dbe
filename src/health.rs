//! Backend health/metrics poller.
//! Every cycle fetches `/health` and `/info` concurrently and replaces the
//! published snapshot as a unit: both succeed, or the backend is offline.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancellation::{run_with_deadline, TaskGeneration};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::settings::SettingsStore;
use crate::translate::{HealthResponse, InfoResponse, TranslationBackend};

/// Last known backend state. Empty means offline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendSnapshot {
    pub health: Option<HealthResponse>,
    pub info: Option<InfoResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendStatus {
    Offline,
    /// Reachable, model still loading.
    Loading,
    Ready,
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Offline => write!(f, "Offline"),
            BackendStatus::Loading => write!(f, "Loading"),
            BackendStatus::Ready => write!(f, "Ready"),
        }
    }
}

impl BackendSnapshot {
    pub fn status(&self) -> BackendStatus {
        match &self.health {
            None => BackendStatus::Offline,
            Some(h) if h.model_loaded => BackendStatus::Ready,
            Some(_) => BackendStatus::Loading,
        }
    }

    /// One-line summary for status bars.
    pub fn summary_line(&self, last_latency_ms: Option<u64>) -> String {
        let mut parts = vec![self.status().to_string()];
        if let Some(ms) = last_latency_ms {
            parts.push(format!("{ms}ms"));
        }
        if let Some(cache) = self.info.as_ref().and_then(|i| i.cache.as_ref()) {
            parts.push(format!(
                "Cache: {} ({} hits, {} entries)",
                cache.hit_rate.as_deref().unwrap_or("-"),
                cache.hits,
                cache.currsize
            ));
        }
        if let Some(uptime) = self.info.as_ref().and_then(|i| i.uptime.as_deref()) {
            parts.push(format!("Uptime: {uptime}"));
        }
        parts.join(" | ")
    }
}

pub struct HealthMonitor {
    backend: Arc<dyn TranslationBackend>,
    settings: Arc<SettingsStore>,
    metrics: Arc<MetricsRegistry>,
    probe_timeout: Duration,
    interval: Duration,
    generation: TaskGeneration,
    snapshot_tx: watch::Sender<BackendSnapshot>,
    snapshot_rx: watch::Receiver<BackendSnapshot>,
}

impl HealthMonitor {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        settings: Arc<SettingsStore>,
        metrics: Arc<MetricsRegistry>,
        probe_timeout: Duration,
        interval: Duration,
    ) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(BackendSnapshot::default());
        Self {
            backend,
            settings,
            metrics,
            probe_timeout,
            interval,
            generation: TaskGeneration::new(),
            snapshot_tx,
            snapshot_rx,
        }
    }

    pub fn snapshot(&self) -> BackendSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> BackendStatus {
        self.snapshot_rx.borrow().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Abort in-flight probes; their results will be discarded.
    pub fn invalidate(&self) {
        let guard = self.generation.cancel_and_advance();
        debug!(generation = guard.my_generation(), "health probes invalidated");
    }

    /// Run one poll cycle now and publish its outcome.
    /// A cycle overtaken by a backend URL change publishes nothing.
    pub async fn refresh_now(&self) -> BackendSnapshot {
        let guard = self.generation.guard();
        let base_url = self.settings.snapshot().backend_url;
        let token = guard.token();
        let span = self.metrics.span(metric_names::HEALTH_PROBE);

        let (health, info) = tokio::join!(
            run_with_deadline(self.probe_timeout, token, self.backend.health(&base_url, token)),
            run_with_deadline(self.probe_timeout, token, self.backend.info(&base_url, token)),
        );

        if !guard.is_current() || self.settings.snapshot().backend_url != base_url {
            debug!(url = %base_url, "stale health cycle discarded");
            return self.snapshot();
        }

        let snapshot = match (health, info) {
            (Ok(health), Ok(info)) => {
                let elapsed_ms = span.finish();
                debug!(url = %base_url, elapsed_ms, model_loaded = health.model_loaded, "health_ok");
                BackendSnapshot {
                    health: Some(health),
                    info: Some(info),
                }
            }
            (health, info) => {
                warn!(
                    url = %base_url,
                    health_error = ?health.err(),
                    info_error = ?info.err(),
                    "backend offline"
                );
                BackendSnapshot::default()
            }
        };

        let previous = self.snapshot_tx.send_replace(snapshot.clone());
        if previous.status() != snapshot.status() {
            info!(from = %previous.status(), to = %snapshot.status(), "backend_status_changed");
        }
        snapshot
    }

    /// Poll on start and then every interval until `shutdown` fires.
    /// A backend URL change triggers an immediate cycle and restarts the
    /// interval.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut settings_rx = self.settings.subscribe();
            let mut current_url = settings_rx.borrow_and_update().backend_url.clone();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_s = self.interval.as_secs(), "health poller started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.refresh_now().await;
                    }
                    changed = settings_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let url = settings_rx.borrow_and_update().backend_url.clone();
                        if url != current_url {
                            info!(from = %current_url, to = %url, "backend url changed");
                            current_url = url;
                            self.invalidate();
                            ticker.reset_immediately();
                        }
                    }
                }
            }
            self.invalidate();
            info!("health poller stopped");
        })
    }
}
