//! Calibration engine (C8, §4.8).
//!
//! A guided enrollment over a fixed phrase catalog, scored phrase-by-phrase
//! with Jaccard word-set similarity, then reduced to a persisted
//! `VoiceProfile`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{unix_timestamp, NoiseLevel};

/// Five-phase catalog (§4.8): basic commands, track commands, mixing
/// terms, complex phrases, slang. ~31 phrases total.
pub const FULL_CATALOG: &[&str] = &[
    // Phase 1: basic commands
    "play", "stop", "record", "pause", "rewind", "undo", "redo",
    // Phase 2: track commands
    "solo track one", "mute track two", "arm track three", "select track four",
    "delete track five", "duplicate track six", "rename track seven",
    // Phase 3: mixing terms
    "pan left", "pan right", "add reverb", "add compression", "boost the bass",
    "cut the highs", "normalize gain",
    // Phase 4: complex phrases
    "solo track one and mute track two", "arm track three for recording",
    "bounce the mix down to stereo", "set the tempo to one twenty",
    "quantize to a sixteenth note",
    // Phase 5: slang
    "kill the verb", "gimme more low end", "bring up the vocals",
    "crank the reverb", "tighten up the low end", "duck the bass under the kick",
];

/// Quick 8-phrase alternative enrollment (§4.8).
pub const QUICK_CATALOG: &[&str] = &[
    "play", "stop", "record", "solo track one", "mute track two",
    "pan left", "add reverb", "bounce the mix down to stereo",
];

/// A scored enrollment phrase (§3 "Calibration result").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub expected: String,
    pub observed: String,
    pub confidence: f32,
    pub match_score: f32,
    pub duration_s: f64,
    pub noise_level: NoiseLevel,
}

/// A named bundle of per-user acoustic characteristics (§3 "Voice profile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub name: String,
    pub accent_tag: String,
    pub speech_rate_wpm: f64,
    pub noise_floor: f32,
    pub custom_pronunciations: BTreeMap<String, String>,
    pub calibration_accuracy: f32,
    pub created_at: f64,
    pub last_used: f64,
}

impl VoiceProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(format!("{}.json", self.name));
        crate::files::atomic_write_json(&path, self)
    }

    pub fn touch_last_used(&mut self) {
        self.last_used = unix_timestamp();
    }
}

/// Jaccard similarity over lowercased word sets (§4.8, scenario 6).
/// Exact string match scores 1.0; an empty observation scores 0.0.
pub fn match_score(expected: &str, observed: &str) -> f32 {
    if observed.trim().is_empty() {
        return 0.0;
    }
    if expected.trim().eq_ignore_ascii_case(observed.trim()) {
        return 1.0;
    }
    let expected_words: HashSet<String> = words(expected);
    let observed_words: HashSet<String> = words(observed);
    if expected_words.is_empty() && observed_words.is_empty() {
        return 1.0;
    }
    let intersection = expected_words.intersection(&observed_words).count();
    let union = expected_words.union(&observed_words).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}

/// `match_score >= ACCURACY_HIT_THRESHOLD` counts as a correct phrase for
/// `accuracy` (§4.8).
const ACCURACY_HIT_THRESHOLD: f32 = 0.8;
/// Phrases below this score are flagged as `low_accuracy_phrases` (§4.8).
const LOW_ACCURACY_THRESHOLD: f32 = 0.7;

/// Derived statistics from a completed enrollment (§4.8), prior to being
/// folded into a `VoiceProfile`.
#[derive(Debug, Clone)]
pub struct CalibrationSummary {
    pub accuracy: f32,
    pub speech_rate_wpm: f64,
    pub avg_noise: f32,
    pub low_accuracy_phrases: Vec<String>,
    pub custom_pronunciations: BTreeMap<String, String>,
}

/// Drives one enrollment session: presents phrases in order, accepts a
/// recorded observation for each, and derives the final summary/profile on
/// completion.
pub struct CalibrationSession {
    catalog: Vec<&'static str>,
    cursor: usize,
    records: Vec<CalibrationRecord>,
    cancelled: bool,
}

impl CalibrationSession {
    pub fn new(catalog: &[&'static str]) -> Self {
        Self {
            catalog: catalog.to_vec(),
            cursor: 0,
            records: Vec::new(),
            cancelled: false,
        }
    }

    pub fn full() -> Self {
        Self::new(FULL_CATALOG)
    }

    pub fn quick() -> Self {
        Self::new(QUICK_CATALOG)
    }

    /// The phrase the UI should prompt next, or `None` if the catalog is
    /// exhausted.
    pub fn next_prompt(&self) -> Option<&'static str> {
        self.catalog.get(self.cursor).copied()
    }

    /// Record one observed phrase against the current prompt and advance
    /// the cursor (§4.8 steps 2-5).
    pub fn submit(&mut self, observed: &str, confidence: f32, duration_s: f64, noise_level: NoiseLevel) {
        let Some(expected) = self.next_prompt() else {
            return;
        };
        self.records.push(CalibrationRecord {
            expected: expected.to_string(),
            observed: observed.to_string(),
            confidence,
            match_score: match_score(expected, observed),
            duration_s,
            noise_level,
        });
        self.cursor += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.catalog.len()
    }

    /// Cancellation clears state atomically; no partial profile is ever
    /// derived from a cancelled session (§4.8).
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.records.clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Reduce the recorded observations into a summary (§4.8). Fails if the
    /// session was cancelled or has no records.
    pub fn summarize(&self) -> Result<CalibrationSummary> {
        if self.cancelled {
            return Err(Error::CalibrationNotActive);
        }
        if self.records.is_empty() {
            return Err(Error::CalibrationNotActive);
        }

        let total = self.records.len();
        let hits = self
            .records
            .iter()
            .filter(|r| r.match_score >= ACCURACY_HIT_THRESHOLD)
            .count();
        let accuracy = 100.0 * hits as f32 / total as f32;

        let total_expected_words: usize = self
            .records
            .iter()
            .map(|r| r.expected.split_whitespace().count())
            .sum();
        let total_duration_s: f64 = self.records.iter().map(|r| r.duration_s).sum();
        let speech_rate_wpm = if total_duration_s > 0.0 {
            60.0 * total_expected_words as f64 / total_duration_s
        } else {
            0.0
        };

        let avg_noise = self
            .records
            .iter()
            .map(|r| match r.noise_level {
                NoiseLevel::Low => 0.005,
                NoiseLevel::Medium => 0.03,
                NoiseLevel::High => 0.1,
            })
            .sum::<f32>()
            / total as f32;

        let low_accuracy_phrases = self
            .records
            .iter()
            .filter(|r| r.match_score < LOW_ACCURACY_THRESHOLD)
            .map(|r| r.expected.clone())
            .collect();

        let custom_pronunciations = derive_pronunciation_drift(&self.records);

        Ok(CalibrationSummary {
            accuracy,
            speech_rate_wpm,
            avg_noise,
            low_accuracy_phrases,
            custom_pronunciations,
        })
    }

    /// Build and persist the `VoiceProfile` for this completed session.
    pub fn finish(&self, name: &str) -> Result<VoiceProfile> {
        let summary = self.summarize()?;
        let now = unix_timestamp();
        Ok(VoiceProfile {
            name: name.to_string(),
            accent_tag: detect_accent(),
            speech_rate_wpm: summary.speech_rate_wpm,
            noise_floor: summary.avg_noise,
            custom_pronunciations: summary.custom_pronunciations,
            calibration_accuracy: summary.accuracy,
            created_at: now,
            last_used: now,
        })
    }
}

/// For each expected word observed at least twice and more often wrong
/// than right, record the single most common misrecognition (§4.8).
fn derive_pronunciation_drift(records: &[CalibrationRecord]) -> BTreeMap<String, String> {
    let mut per_word: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for record in records {
        let expected_words: Vec<String> = record.expected.to_lowercase().split_whitespace().map(String::from).collect();
        let observed_words: Vec<String> = record.observed.to_lowercase().split_whitespace().map(String::from).collect();
        for (idx, expected_word) in expected_words.iter().enumerate() {
            let observed_word = observed_words.get(idx).cloned().unwrap_or_default();
            per_word.entry(expected_word.clone()).or_default().push(observed_word);
        }
    }

    let mut out = BTreeMap::new();
    for (expected_word, observations) in per_word {
        if observations.len() < 2 {
            continue;
        }
        let correct = observations.iter().filter(|o| **o == expected_word).count();
        let wrong = observations.len() - correct;
        if wrong <= correct {
            continue;
        }
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for o in &observations {
            if *o != expected_word && !o.is_empty() {
                *counts.entry(o.clone()).or_insert(0) += 1;
            }
        }
        if let Some((most_common, _)) = counts.into_iter().max_by_key(|(_, count)| *count) {
            out.insert(expected_word, most_common);
        }
    }
    out
}

/// Accent detection is reserved for future use (Open Question, §9):
/// current implementations emit `neutral`.
pub fn detect_accent() -> String {
    "neutral".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(match_score("play", "play"), 1.0);
    }

    #[test]
    fn empty_observation_scores_zero() {
        assert_eq!(match_score("play", ""), 0.0);
    }

    #[test]
    fn scenario_six_jaccard_scoring() {
        // {solo,track} / {solo,track,1,one} = 2/4 = 0.5
        let score = match_score("solo track 1", "solo track one");
        assert!((score - 0.5).abs() < 1e-6, "score={score}");
    }

    #[test]
    fn accuracy_is_100_iff_every_phrase_meets_threshold() {
        let mut session = CalibrationSession::new(&["play", "stop"]);
        session.submit("play", 0.9, 0.5, NoiseLevel::Low);
        session.submit("stop", 0.9, 0.5, NoiseLevel::Low);
        let summary = session.summarize().unwrap();
        assert_eq!(summary.accuracy, 100.0);
    }

    #[test]
    fn accuracy_below_100_when_one_phrase_misses() {
        let mut session = CalibrationSession::new(&["play", "stop"]);
        session.submit("play", 0.9, 0.5, NoiseLevel::Low);
        session.submit("nope", 0.9, 0.5, NoiseLevel::Low);
        let summary = session.summarize().unwrap();
        assert!(summary.accuracy < 100.0);
    }

    #[test]
    fn low_accuracy_phrases_collects_scores_below_point_seven() {
        let mut session = CalibrationSession::new(&["play", "stop"]);
        session.submit("play", 0.9, 0.5, NoiseLevel::Low);
        session.submit("garbage", 0.9, 0.5, NoiseLevel::Low);
        let summary = session.summarize().unwrap();
        assert_eq!(summary.low_accuracy_phrases, vec!["stop".to_string()]);
    }

    #[test]
    fn pronunciation_drift_tracks_consistent_misrecognition() {
        let mut session = CalibrationSession::new(&["solo track one", "solo track one"]);
        session.submit("solo track too", 0.8, 0.5, NoiseLevel::Low);
        session.submit("solo track too", 0.8, 0.5, NoiseLevel::Low);
        let summary = session.summarize().unwrap();
        assert_eq!(
            summary.custom_pronunciations.get("one"),
            Some(&"too".to_string())
        );
    }

    #[test]
    fn cancelled_session_yields_no_summary() {
        let mut session = CalibrationSession::new(&["play"]);
        session.submit("play", 0.9, 0.5, NoiseLevel::Low);
        session.cancel();
        assert!(session.summarize().is_err());
    }

    #[test]
    fn speech_rate_wpm_is_total_words_over_total_duration() {
        let mut session = CalibrationSession::new(&["solo track one"]);
        session.submit("solo track one", 0.9, 3.0, NoiseLevel::Low);
        let summary = session.summarize().unwrap();
        // 3 expected words over 3 s = 60 wpm.
        assert!((summary.speech_rate_wpm - 60.0).abs() < 1e-6);
    }

    #[test]
    fn detect_accent_returns_neutral() {
        assert_eq!(detect_accent(), "neutral");
    }
}
