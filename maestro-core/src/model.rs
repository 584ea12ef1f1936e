//! Shared data model (§3): the types that flow between components.
//!
//! These are the value types the rest of the crate passes around — word
//! timing, transcript results, operating mode, and noise classification.
//! Component-specific aggregates (vocabulary store, voice profile,
//! calibration result, router state) live alongside the component that
//! owns them (`vocab`, `calibration`, `router`).

use serde::{Deserialize, Serialize};

/// Operating mode. Transcripts are routed (and alias-rewritten) only in
/// `Command` mode; `Dictation` mode preserves text verbatim and never
/// reaches the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Command,
    Dictation,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Command => "command",
            Mode::Dictation => "dictation",
        }
    }
}

/// Ambient noise bucket computed from segment RMS (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseLevel {
    Low,
    Medium,
    High,
}

impl NoiseLevel {
    /// low < 0.01 RMS, medium < 0.05, high otherwise.
    pub fn from_rms(rms: f32) -> Self {
        if rms < 0.01 {
            NoiseLevel::Low
        } else if rms < 0.05 {
            NoiseLevel::Medium
        } else {
            NoiseLevel::High
        }
    }
}

/// A single recognised word with per-word timing and confidence.
///
/// Invariant: `start_s <= end_s`. Within one transcript, words are
/// non-overlapping and ordered by `start_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSegment {
    pub word: String,
    pub start_s: f64,
    pub end_s: f64,
    pub confidence: f32,
}

/// The committed hypothesis for one completed utterance (§3 "Transcript
/// result"). The only input the router may act on — see `is_final`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    pub words: Vec<WordSegment>,
    pub confidence: f32,
    pub mode: Mode,
    pub profile_name: Option<String>,
    pub noise_level: NoiseLevel,
    pub timestamp: f64,
    pub is_final: bool,
}

impl TranscriptResult {
    /// Builds a result with `confidence` derived from `words` per the
    /// invariant in §3: mean of word confidences, or 0 when `text` is empty.
    pub fn from_words(
        text: String,
        words: Vec<WordSegment>,
        mode: Mode,
        profile_name: Option<String>,
        noise_level: NoiseLevel,
        timestamp: f64,
        is_final: bool,
    ) -> Self {
        let confidence = if text.is_empty() {
            0.0
        } else if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32
        };
        Self {
            text,
            words,
            confidence,
            mode,
            profile_name,
            noise_level,
            timestamp,
            is_final,
        }
    }

    /// Builds a result with an explicitly supplied `confidence` — for
    /// providers (e.g. `streaming_remote`) that report an overall
    /// confidence without word-level timing. The §3 mean-of-words
    /// invariant only binds when `words` is non-empty.
    pub fn with_confidence(
        text: String,
        confidence: f32,
        mode: Mode,
        profile_name: Option<String>,
        noise_level: NoiseLevel,
        timestamp: f64,
        is_final: bool,
    ) -> Self {
        Self {
            confidence: if text.is_empty() { 0.0 } else { confidence },
            text,
            words: Vec::new(),
            mode,
            profile_name,
            noise_level,
            timestamp,
            is_final,
        }
    }

    /// A zero-confidence, empty-text placeholder — used for timeouts and
    /// rescue fallbacks (§7 `timeout`, `schema_violation`).
    pub fn empty(mode: Mode, profile_name: Option<String>, timestamp: f64, is_final: bool) -> Self {
        Self {
            text: String::new(),
            words: Vec::new(),
            confidence: 0.0,
            mode,
            profile_name,
            noise_level: NoiseLevel::Low,
            timestamp,
            is_final,
        }
    }
}

/// A best-effort mid-utterance hypothesis. Never acted upon by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialTranscript {
    pub text: String,
    pub confidence: f32,
    pub timestamp: f64,
}

/// Current wall-clock time as seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_nanos() as f64 / 1_000_000_000.0
}
