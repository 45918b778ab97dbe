//! Observable UI state: Idle → Translating → Succeeded/Failed → Translating ...
//! Transitions are pure (`UiState::reduce`); `StateMachine` applies them
//! under a lock and publishes every new state on a watch channel.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::translate::{TranslateError, TranslateResult, TranslationMode};

/// Lifecycle of the translation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TranslationPhase {
    Idle,
    Translating,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TranslationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationPhase::Idle => write!(f, "Idle"),
            TranslationPhase::Translating => write!(f, "Translating"),
            TranslationPhase::Succeeded => write!(f, "Succeeded"),
            TranslationPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl TranslationPhase {
    pub fn can_transition_to(self, next: TranslationPhase) -> bool {
        use TranslationPhase::*;
        matches!(
            (self, next),
            (Idle | Succeeded | Failed, Translating)
                | (Translating, Succeeded)
                | (Translating, Failed)
                | (Translating, Idle) // cancelled
        )
    }
}

/// The single user-visible message slot: success and error exclude each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StatusMessage {
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiState {
    pub phase: TranslationPhase,
    pub mode: TranslationMode,
    pub message: Option<StatusMessage>,
    pub last_latency_ms: Option<u64>,
    pub last_result: Option<TranslateResult>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: TranslationPhase::Idle,
            mode: TranslationMode::Text,
            message: None,
            last_latency_ms: None,
            last_result: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Begin(TranslationMode),
    Completed(TranslateResult),
    Failed(TranslateError),
    Cancelled,
}

impl UiState {
    /// Pure transition. Errors name the rejected transition.
    pub fn reduce(&self, event: UiEvent) -> Result<UiState, String> {
        let next_phase = match &event {
            UiEvent::Begin(_) => TranslationPhase::Translating,
            UiEvent::Completed(_) => TranslationPhase::Succeeded,
            UiEvent::Failed(_) => TranslationPhase::Failed,
            UiEvent::Cancelled => TranslationPhase::Idle,
        };
        if !self.phase.can_transition_to(next_phase) {
            return Err(format!("invalid transition: {} -> {}", self.phase, next_phase));
        }

        let mut next = self.clone();
        next.phase = next_phase;
        match event {
            UiEvent::Begin(mode) => {
                next.mode = mode;
                next.message = None;
                next.last_latency_ms = None;
            }
            UiEvent::Completed(result) => {
                next.message = Some(StatusMessage::Success(format!(
                    "Translation completed in {} ms",
                    result.latency_ms
                )));
                next.last_latency_ms = Some(result.latency_ms);
                next.last_result = Some(result);
            }
            UiEvent::Failed(err) => {
                next.message = Some(StatusMessage::Error(user_message(&err)));
            }
            UiEvent::Cancelled => {
                next.message = None;
            }
        }
        Ok(next)
    }
}

/// Text shown to the user for a failed translation.
pub fn user_message(err: &TranslateError) -> String {
    match err {
        TranslateError::EmptyInput => "Nothing to translate: the input is empty".to_string(),
        TranslateError::Timeout { secs } => format!(
            "Timeout: the translation took longer than {secs} seconds. Try a shorter text."
        ),
        TranslateError::Backend { message, .. } => format!("Error: {message}"),
        other => format!("Error: {other}"),
    }
}

/// Thread-safe holder of `UiState` with a watch channel for subscribers.
pub struct StateMachine {
    state: RwLock<UiState>,
    state_tx: watch::Sender<UiState>,
    state_rx: watch::Receiver<UiState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(UiState::default());
        Self {
            state: RwLock::new(UiState::default()),
            state_tx,
            state_rx,
        }
    }

    pub fn current(&self) -> UiState {
        self.state.read().clone()
    }

    pub fn phase(&self) -> TranslationPhase {
        self.state.read().phase
    }

    /// Apply an event; publishes the new state on success.
    pub fn dispatch(&self, event: UiEvent) -> Result<TranslationPhase, String> {
        let mut state = self.state.write();
        let prev = state.phase;
        match state.reduce(event) {
            Ok(next) => {
                let phase = next.phase;
                *state = next.clone();
                self.state_tx.send_replace(next);
                info!(from = %prev, to = %phase, "state_transition");
                Ok(phase)
            }
            Err(msg) => {
                warn!("{}", msg);
                Err(msg)
            }
        }
    }

    /// Enter `Translating`; fails with `InFlight` if already there.
    pub fn begin(&self, mode: TranslationMode) -> Result<(), TranslateError> {
        self.dispatch(UiEvent::Begin(mode))
            .map(|_| ())
            .map_err(|_| TranslateError::InFlight)
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Direction;

    fn result(latency_ms: u64) -> TranslateResult {
        TranslateResult {
            request_id: "r1".into(),
            mode: TranslationMode::Text,
            direction: Direction::EsDa,
            output: "hej".into(),
            latency_ms,
        }
    }

    #[test]
    fn success_and_error_slots_are_exclusive() {
        let s = UiState::default()
            .reduce(UiEvent::Begin(TranslationMode::Text))
            .unwrap()
            .reduce(UiEvent::Completed(result(120)))
            .unwrap();
        assert!(matches!(s.message, Some(StatusMessage::Success(_))));
        assert_eq!(s.last_latency_ms, Some(120));

        let s = s
            .reduce(UiEvent::Begin(TranslationMode::Html))
            .unwrap();
        assert_eq!(s.message, None);
        assert_eq!(s.last_latency_ms, None);

        let s = s
            .reduce(UiEvent::Failed(TranslateError::Network("refused".into())))
            .unwrap();
        assert_eq!(
            s.message,
            Some(StatusMessage::Error("Error: network error: refused".into()))
        );
        assert_eq!(s.phase, TranslationPhase::Failed);
        assert_eq!(s.mode, TranslationMode::Html);
        // previous result stays available
        assert_eq!(s.last_result.unwrap().output, "hej");
    }

    #[test]
    fn cannot_begin_twice() {
        let sm = StateMachine::new();
        sm.begin(TranslationMode::Text).unwrap();
        assert_eq!(sm.begin(TranslationMode::Text), Err(TranslateError::InFlight));
        assert_eq!(sm.phase(), TranslationPhase::Translating);
    }

    #[test]
    fn completion_requires_translating() {
        let sm = StateMachine::new();
        assert!(sm.dispatch(UiEvent::Completed(result(1))).is_err());
        assert_eq!(sm.phase(), TranslationPhase::Idle);
    }

    #[test]
    fn cancel_returns_to_idle() {
        let sm = StateMachine::new();
        sm.begin(TranslationMode::Text).unwrap();
        assert_eq!(sm.dispatch(UiEvent::Cancelled), Ok(TranslationPhase::Idle));
    }

    #[test]
    fn subscribers_see_each_transition() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        sm.begin(TranslationMode::Text).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, TranslationPhase::Translating);
    }

    #[test]
    fn timeout_message_mentions_the_bound() {
        let msg = user_message(&TranslateError::Timeout { secs: 60 });
        assert!(msg.starts_with("Timeout"));
        assert!(msg.contains("60 seconds"));
    }
}
