//! Adaptive energy-based VAD (§4.2).
//!
//! Unlike a fixed RMS threshold, the speech/silence boundary tracks ambient
//! noise: the threshold is `max(FLOOR_FLOOR, 2.5 * noise_floor)`, where
//! `noise_floor` is the 20th-percentile RMS over the last 100 frames
//! classified as silence. The floor only updates on frames *this* detector
//! itself called silent, so a loud utterance never drags the floor up mid
//! sentence — it can only rise between utterances.
//!
//! Hangover/segment-boundary logic is not this module's job; see
//! `vad::segmenter` for the SILENT/SPEAKING state machine built on top of
//! the per-frame decisions this type produces.

use std::collections::VecDeque;

use super::{VadDecision, VoiceActivityDetector};
use crate::buffering::chunk::AudioChunk;

/// Number of most-recent silent-frame RMS samples retained for the
/// percentile estimate.
const HISTORY_LEN: usize = 100;

/// Percentile (0.0-1.0) of the silent-frame RMS history used as the noise
/// floor estimate.
const NOISE_FLOOR_PERCENTILE: f32 = 0.20;

/// Multiplier applied to the noise floor to get the speech threshold.
const THRESHOLD_MULTIPLIER: f32 = 2.5;

/// Lower bound on the speech threshold regardless of how quiet the room is —
/// guards against a near-silent noise floor making the detector trigger on
/// digital noise floor hiss alone.
const FLOOR_FLOOR: f32 = 0.006;

/// Adaptive energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    history: VecDeque<f32>,
}

impl EnergyVad {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Current adaptive threshold given the accumulated silent-frame
    /// history. `FLOOR_FLOOR` until at least one silent frame is observed.
    pub fn threshold(&self) -> f32 {
        THRESHOLD_MULTIPLIER * self.noise_floor().max(FLOOR_FLOOR / THRESHOLD_MULTIPLIER)
    }

    /// 20th-percentile RMS of the silent-frame history, or 0 if empty.
    fn noise_floor(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f32> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f32 - 1.0) * NOISE_FLOOR_PERCENTILE).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn push_silent_sample(&mut self, rms: f32) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(rms);
    }

    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, chunk: &AudioChunk) -> VadDecision {
        let rms = Self::rms(&chunk.samples);
        let threshold = self.threshold();

        if rms >= threshold {
            VadDecision::Speech
        } else {
            // Only silent frames feed the noise-floor estimate (§4.2):
            // speech energy must never drag the floor, and therefore the
            // threshold, upward mid-utterance.
            self.push_silent_sample(rms);
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
