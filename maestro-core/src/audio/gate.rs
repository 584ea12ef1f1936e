//! Speaking-flag gate and barge-in signalling (C1, §4.1).
//!
//! This sits downstream of `AudioCapture`, in the pipeline thread that
//! drains the ring buffer — never in the cpal callback itself, since
//! `SpeakingState::is_speaking` may stat a file and the realtime audio
//! thread must never block on I/O.
//!
//! While the TTS flag is asserted, drained frames are dropped rather than
//! handed to the VAD: the assistant must not transcribe its own voice.
//! The suppression persists for `quiescent_window` after the flag clears,
//! since TTS playback tail and room echo linger past the flag's own
//! lifetime. Barge-in detection is independent of the gate: a loud frame
//! signals the external TTS layer to stop talking even while suppressed,
//! rate-limited by `barge_in_min_interval` so it doesn't retrigger every
//! frame of a shout.

use std::time::{Duration, Instant};

use crate::buffering::chunk::AudioChunk;
use crate::speaking::SpeakingState;
use crate::vad::energy::EnergyVad;

/// Default hangover after the speaking flag clears before frames are
/// trusted again (§4.1: 1.0-1.5 s).
pub const DEFAULT_QUIESCENT_WINDOW: Duration = Duration::from_millis(1200);

/// Minimum spacing between barge-in signals so a sustained shout doesn't
/// flood the external TTS layer with restarts (§6: at most every 50 ms).
pub const DEFAULT_BARGE_IN_MIN_INTERVAL: Duration = Duration::from_millis(50);

/// RMS level above which a frame is loud enough to count as a barge-in
/// attempt, independent of the VAD's own (much lower) speech threshold.
pub const DEFAULT_BARGE_IN_RMS_THRESHOLD: f32 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Frame should continue on to the VAD/segmenter.
    Pass,
    /// Frame was dropped (TTS speaking, or still within the quiescent
    /// window after it stopped).
    Suppressed,
}

pub struct CaptureGate {
    speaking: std::sync::Arc<dyn SpeakingState>,
    quiescent_window: Duration,
    quiescent_until: Option<Instant>,
    barge_in_min_interval: Duration,
    barge_in_rms_threshold: f32,
    last_barge_in: Option<Instant>,
    dropped_frames: u64,
}

impl CaptureGate {
    pub fn new(speaking: std::sync::Arc<dyn SpeakingState>) -> Self {
        Self {
            speaking,
            quiescent_window: DEFAULT_QUIESCENT_WINDOW,
            quiescent_until: None,
            barge_in_min_interval: DEFAULT_BARGE_IN_MIN_INTERVAL,
            barge_in_rms_threshold: DEFAULT_BARGE_IN_RMS_THRESHOLD,
            last_barge_in: None,
            dropped_frames: 0,
        }
    }

    pub fn with_quiescent_window(mut self, window: Duration) -> Self {
        self.quiescent_window = window;
        self
    }

    pub fn with_barge_in(mut self, rms_threshold: f32, min_interval: Duration) -> Self {
        self.barge_in_rms_threshold = rms_threshold;
        self.barge_in_min_interval = min_interval;
        self
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Evaluate one drained chunk. Barge-in signalling runs before the gate
    /// check so it fires even on a frame that is ultimately suppressed.
    pub fn process(&mut self, chunk: &AudioChunk) -> GateDecision {
        let rms = EnergyVad::rms(&chunk.samples);
        self.maybe_signal_barge_in(rms);

        let now = Instant::now();
        if self.speaking.is_speaking() {
            self.quiescent_until = Some(now + self.quiescent_window);
            self.dropped_frames += 1;
            return GateDecision::Suppressed;
        }

        if let Some(until) = self.quiescent_until {
            if now < until {
                self.dropped_frames += 1;
                return GateDecision::Suppressed;
            }
            self.quiescent_until = None;
        }

        GateDecision::Pass
    }

    fn maybe_signal_barge_in(&mut self, rms: f32) {
        if rms < self.barge_in_rms_threshold {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.last_barge_in {
            if now.duration_since(last) < self.barge_in_min_interval {
                return;
            }
        }
        self.last_barge_in = Some(now);
        if let Err(err) = self.speaking.signal_barge_in(rms) {
            tracing::warn!(error = %err, "failed to write barge-in signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speaking::FakeSpeakingState;
    use std::sync::Arc;

    fn chunk(amplitude: f32) -> AudioChunk {
        AudioChunk::new(vec![amplitude; 160], 16000)
    }

    #[test]
    fn passes_frames_when_not_speaking() {
        let speaking = Arc::new(FakeSpeakingState::new(false));
        let mut gate = CaptureGate::new(speaking);
        assert_eq!(gate.process(&chunk(0.01)), GateDecision::Pass);
    }

    #[test]
    fn suppresses_frames_while_speaking() {
        let speaking = Arc::new(FakeSpeakingState::new(true));
        let mut gate = CaptureGate::new(speaking);
        assert_eq!(gate.process(&chunk(0.01)), GateDecision::Suppressed);
        assert_eq!(gate.dropped_frames(), 1);
    }

    #[test]
    fn stays_suppressed_through_quiescent_window() {
        let speaking = Arc::new(FakeSpeakingState::new(true));
        let mut gate = CaptureGate::new(speaking.clone())
            .with_quiescent_window(Duration::from_millis(50));
        assert_eq!(gate.process(&chunk(0.01)), GateDecision::Suppressed);
        speaking.set_speaking(false);
        // Immediately after clearing, still within the quiescent window.
        assert_eq!(gate.process(&chunk(0.01)), GateDecision::Suppressed);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(gate.process(&chunk(0.01)), GateDecision::Pass);
    }

    #[test]
    fn barge_in_fires_on_loud_frame_even_while_suppressed() {
        let speaking = Arc::new(FakeSpeakingState::new(true));
        let mut gate = CaptureGate::new(speaking.clone());
        gate.process(&chunk(0.5));
        assert_eq!(speaking.signals().len(), 1);
    }

    #[test]
    fn barge_in_is_rate_limited() {
        let speaking = Arc::new(FakeSpeakingState::new(true));
        let mut gate = CaptureGate::new(speaking.clone())
            .with_barge_in(0.08, Duration::from_secs(10));
        gate.process(&chunk(0.5));
        gate.process(&chunk(0.5));
        assert_eq!(speaking.signals().len(), 1);
    }

    #[test]
    fn quiet_frame_does_not_trigger_barge_in() {
        let speaking = Arc::new(FakeSpeakingState::new(false));
        let mut gate = CaptureGate::new(speaking.clone());
        gate.process(&chunk(0.01));
        assert!(speaking.signals().is_empty());
    }
}
