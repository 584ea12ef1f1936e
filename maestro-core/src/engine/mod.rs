//! Streaming Engine (C5, §4.5) — the largest single component.
//!
//! `StreamingEngine` is pure orchestration logic with no threads of its
//! own: `pipeline::run` drives it frame-by-frame from the capture thread's
//! output. Kept separate so the tiering/alias/mode-switch/second-pass
//! logic is testable without a real audio device or provider.
//!
//! ## Flow (§4.5)
//!
//! 1. Classify each frame with the VAD, track SILENT/SPEAKING via the
//!    segmenter.
//! 2. While speaking, emit throttled partial transcripts. Feed-capable
//!    providers (`Provider::supports_feed`) get `start_utterance` once and
//!    `feed` on every frame, with partials drawn from a non-blocking
//!    `poll_partial`; providers without that capability fall back to
//!    re-running `transcribe` on the growing in-flight buffer instead.
//! 3. On VAD offset, get a final result — `provider.finalize` for
//!    feed-capable providers, `provider.transcribe` on the whole buffer
//!    otherwise.
//! 4. Resolve vocabulary aliases and detect a mode-switch phrase.
//! 5. Compute `noise_level`, attach profile/mode/timestamp, optionally
//!    rescore with a second pass.

pub mod pipeline;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::buffering::chunk::AudioChunk;
use crate::error::Result;
use crate::model::{unix_timestamp, Mode, NoiseLevel, PartialTranscript, TranscriptResult};
use crate::provider::Provider;
use crate::vad::energy::EnergyVad;
use crate::vad::segmenter::{SegmentEvent, Segmenter, SegmenterConfig};
use crate::vad::{VadDecision, VoiceActivityDetector};
use crate::vocab::VocabularyStore;

/// Second-pass rescoring configuration (§4.5 "Optional second pass").
#[derive(Debug, Clone)]
pub struct SecondPassConfig {
    pub enabled: bool,
    /// Only rerun when the first-pass confidence is at or below this.
    pub max_confidence: f32,
    /// The rerun must beat the first pass by at least this much to win.
    pub min_improvement: f32,
    /// Utterances longer than this are never rerun (cost control).
    pub max_audio_s: f64,
}

impl Default for SecondPassConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_confidence: 0.80,
            min_improvement: 0.08,
            max_audio_s: 6.0,
        }
    }
}

/// Words/patterns that make an utterance eligible for second-pass rescoring
/// (§4.5: "digits or the words *bar*, *measure*, *track*").
fn matches_second_pass_trigger(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.chars().any(|c| c.is_ascii_digit())
        || lowered.split_whitespace().any(|w| matches!(w, "bar" | "measure" | "track"))
}

/// Tunables for the streaming engine (§6 environment-tunables).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// §4.2: ~250ms of speech to confirm an utterance start.
    pub min_speech_s: f64,
    /// §6 `UTTERANCE_END_MS`, default 850ms.
    pub max_silence_s: f64,
    /// §3: utterance segments are bounded to 10s.
    pub max_utterance_s: f64,
    /// VAD frame duration (§3: 30ms).
    pub vad_frame_s: f64,
    /// How often the engine attempts a new partial while speaking (§4.5: ~200ms).
    pub partial_interval_ms: u64,
    /// §6 `PARTIAL_THROTTLE_S`, default 0.15 — minimum spacing between two
    /// emissions of identical partial text.
    pub partial_throttle_s: f64,
    pub second_pass: SecondPassConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            min_speech_s: 0.25,
            max_silence_s: 0.85,
            max_utterance_s: 10.0,
            vad_frame_s: 0.03,
            partial_interval_ms: 200,
            partial_throttle_s: 0.15,
            second_pass: SecondPassConfig::default(),
        }
    }
}

/// One outcome of feeding a frame into the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Partial(PartialTranscript),
    /// A final transcript, plus whether it is eligible for the router
    /// (§4.5: a mode-switch utterance is emitted but never routed), and the
    /// rolling `avg_latency_ms` metric as of this utterance.
    Final {
        result: TranscriptResult,
        routable: bool,
        avg_latency_ms: f64,
    },
}

/// Orchestrates one session's worth of frame-by-frame recognition (C5).
pub struct StreamingEngine {
    config: EngineConfig,
    vad: EnergyVad,
    segmenter: Segmenter,
    provider: Provider,
    second_pass_provider: Option<Provider>,
    vocab: VocabularyStore,
    /// Shared with `SessionCoordinator` so `POST /mode` (§6) and the
    /// mode-switch phrase detected below observe/mutate the same cell.
    mode: Arc<Mutex<Mode>>,
    profile_name: Option<String>,
    preroll: VecDeque<f32>,
    preroll_cap: usize,
    in_flight: Vec<f32>,
    utterance_started_at: Option<Instant>,
    /// Whether `provider.start_utterance` has been issued for the current
    /// utterance yet (feed-capable providers only — §4.4).
    provider_started: bool,
    last_partial_attempt: Option<Instant>,
    last_partial_text: String,
    last_partial_text_emitted_at: Option<Instant>,
    latencies_ms: VecDeque<f64>,
}

const LATENCY_WINDOW: usize = 100;

impl StreamingEngine {
    pub fn new(config: EngineConfig, provider: Provider, vocab: VocabularyStore) -> Self {
        Self::with_shared_mode(config, provider, vocab, Arc::new(Mutex::new(Mode::Command)))
    }

    pub fn with_shared_mode(
        config: EngineConfig,
        provider: Provider,
        vocab: VocabularyStore,
        mode: Arc<Mutex<Mode>>,
    ) -> Self {
        let segmenter_config = SegmenterConfig::from_durations(
            config.vad_frame_s,
            config.min_speech_s,
            config.max_silence_s,
        );
        let preroll_cap = (segmenter_config.min_speech_frames as usize)
            * (config.vad_frame_s * config.sample_rate as f64).round() as usize;
        Self {
            config,
            vad: EnergyVad::new(),
            segmenter: Segmenter::new(segmenter_config),
            provider,
            second_pass_provider: None,
            vocab,
            mode,
            profile_name: None,
            preroll: VecDeque::with_capacity(preroll_cap.max(1)),
            preroll_cap: preroll_cap.max(1),
            in_flight: Vec::new(),
            utterance_started_at: None,
            provider_started: false,
            last_partial_attempt: None,
            last_partial_text: String::new(),
            last_partial_text_emitted_at: None,
            latencies_ms: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.lock()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub fn shared_mode(&self) -> Arc<Mutex<Mode>> {
        Arc::clone(&self.mode)
    }

    pub fn set_active_profile(&mut self, profile_name: Option<String>) {
        self.profile_name = profile_name;
    }

    pub fn reload_vocabulary(&mut self, vocab: VocabularyStore) {
        self.vocab = vocab;
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.provider.warm_up()
    }

    /// Install a provider that stands in for the larger second-pass model.
    /// Per Design Notes §9, the caller lazily constructs it on first use and
    /// retains it for the session's lifetime; the engine simply holds
    /// whatever it is handed once a rescore is actually attempted.
    pub fn install_second_pass(&mut self, provider: Provider) {
        self.second_pass_provider = Some(provider);
    }

    pub fn has_second_pass(&self) -> bool {
        self.second_pass_provider.is_some()
    }

    /// Rolling average of the last 100 end-to-emit latencies (§4.5).
    pub fn avg_latency_ms(&self) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }
        self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
    }

    fn record_latency(&mut self, since: Instant) {
        let ms = since.elapsed().as_secs_f64() * 1000.0;
        if self.latencies_ms.len() == LATENCY_WINDOW {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(ms);
    }

    /// Feed one VAD-frame-sized chunk. `external_vad`, when present, is
    /// authoritative over the energy classification for segmentation
    /// purposes, but the adaptive noise floor still updates from the raw
    /// energy signal regardless (§4.2).
    pub fn process_frame(&mut self, chunk: &AudioChunk, external_vad: Option<VadDecision>) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let decision = self.vad.classify(chunk);
        let was_speaking = self.segmenter.is_speaking();
        let boundary = self.segmenter.process(decision, external_vad);

        if !was_speaking && !self.segmenter.is_speaking() {
            self.push_preroll(chunk);
        }

        match boundary {
            Some(SegmentEvent::Started) => {
                self.utterance_started_at = Some(Instant::now());
                self.provider_started = false;
                self.in_flight.clear();
                self.in_flight.extend(self.preroll.iter().copied());
                self.preroll.clear();
                self.in_flight.extend_from_slice(&chunk.samples);
                self.last_partial_attempt = Some(Instant::now());
                self.last_partial_text.clear();
                self.last_partial_text_emitted_at = None;
                let seed = self.in_flight.clone();
                self.feed_provider(&seed);
            }
            Some(SegmentEvent::Ended) => {
                self.append_bounded(chunk);
                self.feed_provider(&chunk.samples);
                let speech_ended_at = Instant::now();
                if let Some(event) = self.finalize_utterance(speech_ended_at) {
                    events.push(event);
                }
                self.in_flight.clear();
                self.utterance_started_at = None;
                self.provider_started = false;
            }
            None => {
                if self.segmenter.is_speaking() {
                    self.append_bounded(chunk);
                    self.feed_provider(&chunk.samples);
                    if let Some(event) = self.maybe_emit_partial() {
                        events.push(event);
                    }
                }
            }
        }

        events
    }

    fn push_preroll(&mut self, chunk: &AudioChunk) {
        for &sample in &chunk.samples {
            if self.preroll.len() == self.preroll_cap {
                self.preroll.pop_front();
            }
            self.preroll.push_back(sample);
        }
    }

    fn append_bounded(&mut self, chunk: &AudioChunk) {
        let max_samples = (self.config.max_utterance_s * self.config.sample_rate as f64) as usize;
        if self.in_flight.len() >= max_samples {
            return;
        }
        let remaining = max_samples - self.in_flight.len();
        if chunk.samples.len() <= remaining {
            self.in_flight.extend_from_slice(&chunk.samples);
        } else {
            self.in_flight.extend_from_slice(&chunk.samples[..remaining]);
        }
    }

    /// Issue `provider.start_utterance` exactly once per utterance, for
    /// providers that support the feed-based capability set (§4.4). A no-op
    /// for providers that don't.
    fn ensure_utterance_started(&mut self) {
        if self.provider_started || !self.provider.supports_feed() {
            return;
        }
        let prompt = self.vocab.boost_prompt();
        if let Err(err) = self.provider.start_utterance(&prompt) {
            warn!(error = %err, "failed to start incremental provider utterance");
        }
        self.provider_started = true;
    }

    /// Forward samples to a feed-capable provider as they arrive, instead of
    /// re-sending the whole in-flight buffer on every partial probe. A no-op
    /// for providers that don't support incremental feed.
    fn feed_provider(&mut self, samples: &[f32]) {
        if !self.provider.supports_feed() {
            return;
        }
        self.ensure_utterance_started();
        if let Err(err) = self.provider.feed(samples) {
            warn!(error = %err, "failed to feed samples to incremental provider");
        }
    }

    fn maybe_emit_partial(&mut self) -> Option<EngineEvent> {
        let interval = Duration::from_millis(self.config.partial_interval_ms);
        let due = match self.last_partial_attempt {
            Some(last) => last.elapsed() >= interval,
            None => true,
        };
        if !due {
            return None;
        }
        self.last_partial_attempt = Some(Instant::now());

        let transcript = if self.provider.supports_feed() {
            // Non-blocking peek at whatever the provider has produced so
            // far — no reconnect, no resend of the boost handshake (§4.4).
            self.provider.poll_partial(self.config.sample_rate)?
        } else {
            let prompt = self.vocab.boost_prompt();
            let result = match self.provider.transcribe(&self.in_flight, self.config.sample_rate, &prompt) {
                Ok(r) => r,
                Err(err) => {
                    // Partial-transcript errors are swallowed with a logged
                    // warning, never surfaced (§7).
                    warn!(error = %err, "partial transcribe failed, dropping partial");
                    return None;
                }
            };
            PartialTranscript {
                text: result.text,
                confidence: result.confidence,
                timestamp: unix_timestamp(),
            }
        };

        let throttle = Duration::from_secs_f64(self.config.partial_throttle_s);
        if transcript.text == self.last_partial_text {
            if let Some(last_emit) = self.last_partial_text_emitted_at {
                if last_emit.elapsed() < throttle {
                    return None;
                }
            }
        }
        self.last_partial_text = transcript.text.clone();
        self.last_partial_text_emitted_at = Some(Instant::now());

        Some(EngineEvent::Partial(transcript))
    }

    /// `speech_ended_at` is the VAD-offset instant (§4.5 "a rolling window
    /// of the last 100 end-to-emit latencies") — captured by the caller at
    /// `SegmentEvent::Ended`, not at utterance start, so the recorded
    /// latency is speech-end-to-emission, not the whole utterance duration.
    fn finalize_utterance(&mut self, speech_ended_at: Instant) -> Option<EngineEvent> {
        self.utterance_started_at?;
        if self.in_flight.is_empty() {
            return None;
        }

        let duration_s = self.in_flight.len() as f64 / self.config.sample_rate as f64;
        let noise_level = NoiseLevel::from_rms(EnergyVad::rms(&self.in_flight));
        let prompt = self.vocab.boost_prompt();
        let current_mode = self.mode();

        let mut result = if self.provider.supports_feed() {
            match self.provider.finalize(self.config.sample_rate) {
                Ok(r) => r,
                Err(err) => {
                    warn!(error = %err, "final transcribe failed, emitting empty final");
                    TranscriptResult::empty(current_mode, self.profile_name.clone(), unix_timestamp(), true)
                }
            }
        } else {
            match self.provider.transcribe(&self.in_flight, self.config.sample_rate, &prompt) {
                Ok(r) => r,
                Err(err) => {
                    // §7 `timeout`/provider failure: emit an empty final rather
                    // than surfacing an error past this component.
                    warn!(error = %err, "final transcribe failed, emitting empty final");
                    TranscriptResult::empty(current_mode, self.profile_name.clone(), unix_timestamp(), true)
                }
            }
        };
        result.mode = current_mode;
        result.profile_name = self.profile_name.clone();
        result.noise_level = noise_level;
        result.timestamp = unix_timestamp();
        result.is_final = true;

        if self.config.second_pass.enabled
            && result.confidence <= self.config.second_pass.max_confidence
            && duration_s <= self.config.second_pass.max_audio_s
            && matches_second_pass_trigger(&result.text)
        {
            if let Some(second_pass) = self.second_pass_provider.as_mut() {
                match second_pass.transcribe(&self.in_flight, self.config.sample_rate, &prompt) {
                    Ok(mut rescored) if rescored.confidence >= result.confidence + self.config.second_pass.min_improvement => {
                        rescored.mode = current_mode;
                        rescored.profile_name = self.profile_name.clone();
                        rescored.noise_level = noise_level;
                        rescored.timestamp = unix_timestamp();
                        rescored.is_final = true;
                        debug!(
                            first_pass = result.confidence,
                            second_pass = rescored.confidence,
                            "second pass improved confidence, replacing result"
                        );
                        result = rescored;
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "second-pass rescoring failed, keeping first pass"),
                }
            }
        }

        // Mode-switch detection runs before alias resolution (§4.5).
        let trimmed = result.text.trim().to_lowercase();
        let is_mode_switch = trimmed.contains("dictation mode") || trimmed.contains("command mode");
        let routable;

        if is_mode_switch {
            let new_mode = if trimmed.contains("dictation mode") {
                Mode::Dictation
            } else {
                Mode::Command
            };
            self.set_mode(new_mode);
            result.mode = new_mode;
            routable = false;
        } else {
            result.text = self.vocab.resolve_alias(&result.text, current_mode);
            routable = true;
        }

        self.record_latency(speech_ended_at);
        let avg_latency_ms = self.avg_latency_ms();

        Some(EngineEvent::Final { result, routable, avg_latency_ms })
    }
}
