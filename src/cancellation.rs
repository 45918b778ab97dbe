//! Cancellation framework: deadlines on backend calls + generation guard.
//! A call that outlives its deadline is aborted through its token and reported
//! as a timeout; work from a superseded generation must not publish results.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::translate::TranslateError;

/// Run `work` for at most `limit`. On expiry `token` is cancelled (so the
/// backend drops its connection) and `TranslateError::Timeout` is returned.
pub async fn run_with_deadline<T, F>(
    limit: Duration,
    token: &CancellationToken,
    work: F,
) -> Result<T, TranslateError>
where
    F: Future<Output = Result<T, TranslateError>>,
{
    tokio::select! {
        result = work => result,
        _ = tokio::time::sleep(limit) => {
            token.cancel();
            debug!(limit_ms = limit.as_millis() as u64, "deadline_expired");
            Err(TranslateError::Timeout { secs: limit.as_secs() })
        }
    }
}

/// Each new unit of work advances the generation, cancels the previous
/// token, and hands out a fresh one.
pub struct TaskGeneration {
    current_token: RwLock<CancellationToken>,
    generation: Arc<AtomicU64>,
}

impl Default for TaskGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel current work, advance, and return a guard for the new generation.
    pub fn cancel_and_advance(&self) -> GenerationGuard {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let new_root = CancellationToken::new();
        let child = new_root.child_token();
        *token_guard = new_root;
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            my_generation: gen,
            token: child,
        }
    }

    /// Guard for the current generation without cancelling anything.
    pub fn guard(&self) -> GenerationGuard {
        let token_guard = self.current_token.read();
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            my_generation: self.generation.load(Ordering::SeqCst),
            token: token_guard.child_token(),
        }
    }

    /// Cancel current work without advancing.
    pub fn cancel_all(&self) {
        self.current_token.read().cancel();
    }
}

/// Checked by a task before it publishes results.
#[derive(Clone)]
pub struct GenerationGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
    token: CancellationToken,
}

impl GenerationGuard {
    /// True while no newer generation has started.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn my_generation(&self) -> u64 {
        self.my_generation
    }
}
