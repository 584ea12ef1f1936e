//! Command router (C7, §4.7).
//!
//! Tiers each final transcript into execute / confirm / repeat. The pending
//! slot and counters are a single mutex-guarded struct so the external
//! request handler (T4) and the streaming engine (T2) agree on state
//! without touching the audio path (§5 "Shared-resource policy").

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{unix_timestamp, Mode, NoiseLevel, TranscriptResult};

/// > 0.85 confidence routes straight to execution.
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.85;
/// > 0.55 confidence asks for confirmation; at or below is a low-confidence
/// repeat prompt.
pub const MEDIUM_CONFIDENCE_THRESHOLD: f32 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Execute,
    Confirm,
    Repeat,
    /// Non-final (partial) transcript — status update only, no tiering.
    StatusOnly,
    /// No pending slot to confirm/cancel.
    NoOp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterCounters {
    pub total: u64,
    pub executed: u64,
    pub confirmed: u64,
    pub repeated: u64,
}

struct State {
    pending: Option<String>,
    counters: RouterCounters,
}

/// One optional pending slot plus running counters (§3 "Router state").
pub struct Router {
    state: Mutex<State>,
}

/// The outcome of routing one final transcript: the tier chosen, and the
/// canonical command text to write to the command-output file, if any.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub action: RouteAction,
    /// Present only when `action` should produce a command-file write.
    pub command_text: Option<String>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: None,
                counters: RouterCounters::default(),
            }),
        }
    }

    pub fn counters(&self) -> RouterCounters {
        self.state.lock().counters.clone()
    }

    pub fn pending(&self) -> Option<String> {
        self.state.lock().pending.clone()
    }

    /// Route one transcript result. Pure function of
    /// `(confidence, is_final, pending_state)` (I2) — the only side effect
    /// is the counter/pending-slot update, which this call itself performs.
    pub fn route(&self, result: &TranscriptResult) -> RouteResult {
        if !result.is_final {
            return RouteResult {
                action: RouteAction::StatusOnly,
                command_text: None,
            };
        }

        let mut state = self.state.lock();
        state.counters.total += 1;

        if result.confidence > HIGH_CONFIDENCE_THRESHOLD {
            state.pending = None;
            state.counters.executed += 1;
            RouteResult {
                action: RouteAction::Execute,
                command_text: Some(result.text.clone()),
            }
        } else if result.confidence > MEDIUM_CONFIDENCE_THRESHOLD {
            state.pending = Some(result.text.clone());
            RouteResult {
                action: RouteAction::Confirm,
                command_text: None,
            }
        } else {
            state.counters.repeated += 1;
            RouteResult {
                action: RouteAction::Repeat,
                command_text: None,
            }
        }
    }

    /// External `confirm()` (§4.7): write the pending text with confidence
    /// forced to 1.0 and clear the slot; a no-op if nothing is pending.
    pub fn confirm(&self) -> RouteResult {
        let mut state = self.state.lock();
        match state.pending.take() {
            Some(text) => {
                state.counters.confirmed += 1;
                RouteResult {
                    action: RouteAction::Execute,
                    command_text: Some(text),
                }
            }
            None => RouteResult {
                action: RouteAction::NoOp,
                command_text: None,
            },
        }
    }

    /// External `cancel()` (§4.7): clear the pending slot unconditionally.
    pub fn cancel(&self) {
        self.state.lock().pending = None;
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a placeholder final `TranscriptResult` for router tests, skipping
/// the word-level confidence derivation in `model::TranscriptResult`.
#[cfg(test)]
fn final_result(text: &str, confidence: f32) -> TranscriptResult {
    TranscriptResult {
        text: text.to_string(),
        words: Vec::new(),
        confidence,
        mode: Mode::Command,
        profile_name: None,
        noise_level: NoiseLevel::Low,
        timestamp: unix_timestamp(),
        is_final: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_confidence_executes_and_clears_pending() {
        let router = Router::new();
        let result = router.route(&final_result("play", 0.95));
        assert_eq!(result.action, RouteAction::Execute);
        assert_eq!(result.command_text.as_deref(), Some("play"));
        assert_eq!(router.counters().executed, 1);
        assert!(router.pending().is_none());
    }

    #[test]
    fn medium_confidence_sets_pending_without_command_write() {
        let router = Router::new();
        let result = router.route(&final_result("arm track 5", 0.70));
        assert_eq!(result.action, RouteAction::Confirm);
        assert!(result.command_text.is_none());
        assert_eq!(router.pending().as_deref(), Some("arm track 5"));
    }

    #[test]
    fn confirm_after_medium_writes_command_and_clears_pending() {
        let router = Router::new();
        router.route(&final_result("arm track 5", 0.70));
        let confirmed = router.confirm();
        assert_eq!(confirmed.action, RouteAction::Execute);
        assert_eq!(confirmed.command_text.as_deref(), Some("arm track 5"));
        assert!(router.pending().is_none());
        assert_eq!(router.counters().confirmed, 1);
    }

    #[test]
    fn low_confidence_is_repeat_with_no_command() {
        let router = Router::new();
        let result = router.route(&final_result("mumble", 0.40));
        assert_eq!(result.action, RouteAction::Repeat);
        assert!(result.command_text.is_none());
        assert_eq!(router.counters().repeated, 1);
    }

    #[test]
    fn new_medium_overwrites_older_pending() {
        let router = Router::new();
        router.route(&final_result("arm track 5", 0.70));
        router.route(&final_result("mute track 2", 0.72));
        assert_eq!(router.pending().as_deref(), Some("mute track 2"));
    }

    #[test]
    fn partial_transcript_is_status_only() {
        let router = Router::new();
        let mut result = final_result("solo tra", 0.90);
        result.is_final = false;
        let routed = router.route(&result);
        assert_eq!(routed.action, RouteAction::StatusOnly);
        assert_eq!(router.counters().total, 0);
    }

    #[test]
    fn confirm_without_pending_is_noop() {
        let router = Router::new();
        let result = router.confirm();
        assert_eq!(result.action, RouteAction::NoOp);
    }

    #[test]
    fn cancel_clears_pending() {
        let router = Router::new();
        router.route(&final_result("arm track 5", 0.70));
        router.cancel();
        assert!(router.pending().is_none());
    }
}
