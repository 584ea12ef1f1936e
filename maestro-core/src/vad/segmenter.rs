//! SILENT/SPEAKING segment state machine (C2, §4.2).
//!
//! `EnergyVad` (or an external VAD) only classifies individual frames; the
//! segmenter turns that stream of per-frame decisions into segment
//! boundaries the streaming engine can act on:
//!
//! - `min_speech_frames` consecutive speech frames (~250 ms) before a
//!   SILENT -> SPEAKING transition is confirmed, so a single loud click
//!   does not open an utterance.
//! - `max_silence_frames` consecutive silence frames (~1.0-1.5 s) before a
//!   SPEAKING -> SILENT transition closes it, giving the speaker room to
//!   pause mid-sentence.
//!
//! A lone frame that disagrees with the direction currently being confirmed
//! only *decrements* the run counter rather than resetting it to zero —
//! this is the tie-break stickiness: one ambiguous frame in the middle of a
//! confirming run does not throw the whole run away.

use super::VadDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Silent,
    Speaking,
}

/// An externally supplied binary VAD decision for the current frame.
/// When present it is authoritative over the per-frame `EnergyVad` output,
/// but the adaptive noise floor keeps updating from the raw energy signal
/// regardless (handled by the caller, which still feeds silence-classified
/// frames to `EnergyVad::classify`).
pub type ExternalOverride = Option<VadDecision>;

/// A segment boundary crossed by the most recently processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// SILENT -> SPEAKING: an utterance has started.
    Started,
    /// SPEAKING -> SILENT: an utterance has ended.
    Ended,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    pub min_speech_frames: u32,
    pub max_silence_frames: u32,
}

impl SegmenterConfig {
    /// Build frame-count thresholds from a frame duration and the target
    /// durations in seconds (§4.2: ~250 ms to confirm speech, ~1.0-1.5 s to
    /// confirm the end of an utterance).
    pub fn from_durations(frame_duration_s: f64, min_speech_s: f64, max_silence_s: f64) -> Self {
        let to_frames = |d: f64| -> u32 {
            if frame_duration_s <= 0.0 {
                1
            } else {
                ((d / frame_duration_s).round() as u32).max(1)
            }
        };
        Self {
            min_speech_frames: to_frames(min_speech_s),
            max_silence_frames: to_frames(max_silence_s),
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        // Assumes a ~20ms frame: 250ms / 20ms = 13, 1.2s / 20ms = 60.
        Self::from_durations(0.02, 0.25, 1.2)
    }
}

/// SILENT/SPEAKING finite-state machine driven by per-frame VAD decisions.
pub struct Segmenter {
    config: SegmenterConfig,
    state: State,
    run: u32,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: State::Silent,
            run: 0,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state == State::Speaking
    }

    /// Feed one frame's decision. `external` overrides `decision` when
    /// present (§4.2 "optional externally supplied VAD").
    pub fn process(&mut self, decision: VadDecision, external: ExternalOverride) -> Option<SegmentEvent> {
        let effective = external.unwrap_or(decision);

        match self.state {
            State::Silent => {
                if effective.is_speech() {
                    self.run += 1;
                    if self.run >= self.config.min_speech_frames {
                        self.state = State::Speaking;
                        self.run = 0;
                        return Some(SegmentEvent::Started);
                    }
                } else {
                    // Tie-break stickiness: decrement rather than zero.
                    self.run = self.run.saturating_sub(1);
                }
                None
            }
            State::Speaking => {
                if !effective.is_speech() {
                    self.run += 1;
                    if self.run >= self.config.max_silence_frames {
                        self.state = State::Silent;
                        self.run = 0;
                        return Some(SegmentEvent::Ended);
                    }
                } else {
                    self.run = self.run.saturating_sub(1);
                }
                None
            }
        }
    }

    /// Force the segmenter back to SILENT, e.g. after an explicit stop or a
    /// forced flush (§4.5).
    pub fn reset(&mut self) {
        self.state = State::Silent;
        self.run = 0;
    }
}
