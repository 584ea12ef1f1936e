//! Session coordinator (C9, §4.9).
//!
//! Owns the lifecycle: loads the active profile, selects the provider,
//! starts C1 (audio capture) → C2/C5 (VAD + streaming engine via
//! `engine::pipeline`), wires the result to C7 (router), and exposes the
//! small request surface `maestro-daemon`'s HTTP layer calls into (§6).
//!
//! Grounded on `dictum-core/src/engine/mod.rs`'s `DictumEngine`: idempotent
//! `start`/`stop`, shared state behind `parking_lot`, a background thread
//! draining engine output instead of the teacher's `broadcast` channel
//! (there is no second consumer here beyond the dispatcher itself).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::gate::CaptureGate;
use crate::audio::AudioCapture;
use crate::buffering::create_audio_ring;
use crate::buffering::ring::RingBuffer;
use crate::engine::pipeline::{self, PipelineContext};
use crate::engine::{EngineConfig, EngineEvent, StreamingEngine};
use crate::error::Result;
use crate::files::{atomic_write_json, write_command_file};
use crate::model::Mode;
use crate::provider::Provider;
use crate::router::{RouteAction, Router, RouterCounters};
use crate::speaking::SpeakingState;
use crate::vocab::VocabularyStore;

/// Bounded join timeout for `stop()` (§5 "Cancellation and timeouts").
/// The pipeline's 5 ms idle-sleep granularity keeps real joins well under
/// this; it documents the intended bound rather than enforcing a hard
/// deadline on the `JoinHandle`.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Well-known filesystem paths this session reads from / writes to (§6).
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub command_file: PathBuf,
    pub status_file: PathBuf,
    pub vocab_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Default)]
struct LastStatus {
    text: String,
    confidence: f32,
    is_final: bool,
    timestamp: f64,
}

/// Snapshot returned by `GET /status` (§6 "current session stats").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub paused: bool,
    pub mode: Mode,
    pub profile_name: Option<String>,
    pub provider: String,
    pub counters: RouterCounters,
    pub avg_latency_ms: f64,
    pub last_text: String,
    pub last_confidence: f32,
    pub last_is_final: bool,
    pub last_timestamp: f64,
}

/// Status-file JSON payload (§6, exact field set).
#[derive(Serialize)]
struct StatusFilePayload<'a> {
    text: &'a str,
    confidence: f32,
    mode: &'static str,
    timestamp: f64,
    is_final: bool,
    provider: &'a str,
}

struct SessionThreads {
    capture: JoinHandle<()>,
    pipeline: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Owns C1-C7 for the lifetime of one running session (§4.9).
pub struct SessionCoordinator {
    paths: SessionPaths,
    engine_config: EngineConfig,
    device_preference: Option<String>,
    speaking: Arc<dyn SpeakingState>,
    provider_factory: Arc<dyn Fn() -> Provider + Send + Sync>,
    router: Arc<Router>,
    mode: Arc<Mutex<Mode>>,
    profile_name: Mutex<Option<String>>,
    provider_name: Mutex<&'static str>,
    lifecycle: Mutex<LifecycleState>,
    running_flag: Arc<AtomicBool>,
    paused_flag: Arc<AtomicBool>,
    last_status: Arc<Mutex<LastStatus>>,
    avg_latency_ms: Arc<Mutex<f64>>,
    threads: Mutex<Option<SessionThreads>>,
    /// C3 (§4.3): a rolling mirror of gate-passed audio, serving "the last
    /// N seconds" to late consumers (e.g. calibration) independent of
    /// whatever segment boundary the engine currently has open.
    ring: Arc<RingBuffer>,
}

/// Default C3 capacity: ~30s at the engine's sample rate (§4.3).
const RING_SECONDS: f64 = 30.0;

impl SessionCoordinator {
    pub fn new(
        paths: SessionPaths,
        engine_config: EngineConfig,
        device_preference: Option<String>,
        speaking: Arc<dyn SpeakingState>,
        provider_factory: Arc<dyn Fn() -> Provider + Send + Sync>,
        initial_mode: Mode,
        profile_name: Option<String>,
    ) -> Self {
        let ring_capacity = (RING_SECONDS * engine_config.sample_rate as f64) as usize;
        Self {
            paths,
            engine_config,
            device_preference,
            speaking,
            provider_factory,
            router: Arc::new(Router::new()),
            mode: Arc::new(Mutex::new(initial_mode)),
            profile_name: Mutex::new(profile_name),
            provider_name: Mutex::new("local"),
            lifecycle: Mutex::new(LifecycleState::Stopped),
            running_flag: Arc::new(AtomicBool::new(false)),
            paused_flag: Arc::new(AtomicBool::new(false)),
            last_status: Arc::new(Mutex::new(LastStatus::default())),
            avg_latency_ms: Arc::new(Mutex::new(0.0)),
            threads: Mutex::new(None),
            ring: Arc::new(RingBuffer::new(ring_capacity.max(1))),
        }
    }

    /// Start C1 → C2/C5, idempotent (§4.9): a no-op if already running.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == LifecycleState::Running {
            return Ok(());
        }

        self.running_flag.store(true, Ordering::SeqCst);
        self.paused_flag.store(false, Ordering::SeqCst);

        let vocab = VocabularyStore::load(&self.paths.vocab_file)?;

        let mut provider = (self.provider_factory)();
        if let Err(err) = provider.warm_up() {
            warn!(error = %err, "provider warm-up failed, continuing without it");
        }
        *self.provider_name.lock() = provider.name();

        let mut engine = StreamingEngine::with_shared_mode(
            self.engine_config.clone(),
            provider,
            vocab,
            Arc::clone(&self.mode),
        );
        engine.set_active_profile(self.profile_name.lock().clone());

        let (producer, consumer) = create_audio_ring();
        let (rate_tx, rate_rx) = std::sync::mpsc::channel::<u32>();
        let fallback_sample_rate = self.engine_config.sample_rate;
        let device_preference = self.device_preference.clone();
        let capture_running = Arc::clone(&self.running_flag);
        let stream_running = Arc::clone(&self.running_flag);

        let capture_handle = std::thread::Builder::new()
            .name("maestro-audio-capture".into())
            .spawn(move || {
                match AudioCapture::open_with_preference(
                    producer,
                    stream_running,
                    device_preference.as_deref(),
                ) {
                    Ok(capture) => {
                        let _ = rate_tx.send(capture.sample_rate);
                        while capture_running.load(Ordering::Relaxed) {
                            std::thread::sleep(Duration::from_millis(50));
                        }
                        capture.stop();
                    }
                    Err(err) => {
                        warn!(error = %err, "audio capture unavailable; pipeline will idle on an empty ring");
                        let _ = rate_tx.send(fallback_sample_rate);
                    }
                }
            })
            .expect("failed to spawn audio capture thread");

        let capture_sample_rate = rate_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap_or(fallback_sample_rate);

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let gate = CaptureGate::new(Arc::clone(&self.speaking));
        let pipeline_running = Arc::clone(&self.running_flag);
        let target_sample_rate = self.engine_config.sample_rate;
        self.ring.clear();
        let ring = Arc::clone(&self.ring);

        let pipeline_handle = std::thread::Builder::new()
            .name("maestro-pipeline".into())
            .spawn(move || {
                pipeline::run(PipelineContext {
                    engine,
                    gate,
                    consumer,
                    capture_sample_rate,
                    target_sample_rate,
                    running: pipeline_running,
                    events_tx,
                    ring,
                });
            })
            .expect("failed to spawn pipeline thread");

        let dispatcher_handle = self.spawn_dispatcher(events_rx);

        *lifecycle = LifecycleState::Running;
        *self.threads.lock() = Some(SessionThreads {
            capture: capture_handle,
            pipeline: pipeline_handle,
            dispatcher: dispatcher_handle,
        });

        Ok(())
    }

    fn spawn_dispatcher(&self, events_rx: Receiver<EngineEvent>) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let mode = Arc::clone(&self.mode);
        let paused = Arc::clone(&self.paused_flag);
        let provider_name = Mutex::new(*self.provider_name.lock());
        let paths = self.paths.clone();
        let last_status = Arc::clone(&self.last_status);
        let avg_latency_ms = Arc::clone(&self.avg_latency_ms);

        std::thread::Builder::new()
            .name("maestro-dispatcher".into())
            .spawn(move || {
                let provider = *provider_name.lock();
                for event in events_rx.iter() {
                    dispatch_event(event, &router, &mode, &paused, provider, &paths, &last_status, &avg_latency_ms);
                }
            })
            .expect("failed to spawn dispatcher thread")
    }

    /// Stop all session threads, idempotent (§4.9). Blocks until the
    /// capture, pipeline and dispatcher threads have returned — bounded in
    /// practice by the pipeline's 5 ms idle-poll granularity (§5).
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == LifecycleState::Stopped {
            return Ok(());
        }

        self.running_flag.store(false, Ordering::SeqCst);

        if let Some(threads) = self.threads.lock().take() {
            let _ = threads.capture.join();
            let _ = threads.pipeline.join();
            let _ = threads.dispatcher.join();
        }

        *lifecycle = LifecycleState::Stopped;
        Ok(())
    }

    /// Suspend delivery of final transcripts to the router without
    /// tearing down the audio pipeline (§4.9).
    pub fn pause(&self) {
        self.paused_flag.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused_flag.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused_flag.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == LifecycleState::Running
    }

    /// `POST /confirm` (§6): write the pending command, synchronous and
    /// lock-free with respect to the audio path (§5).
    pub fn confirm(&self) -> Result<()> {
        let routed = self.router.confirm();
        if let RouteAction::Execute = routed.action {
            if let Some(text) = routed.command_text {
                write_command_file(&self.paths.command_file, &text)?;
            }
        }
        Ok(())
    }

    /// `POST /cancel` (§6): drop the pending slot unconditionally.
    pub fn cancel(&self) {
        self.router.cancel();
    }

    /// `POST /mode` (§6): direct external override, observed by the
    /// streaming engine on its next frame via the shared `mode` cell.
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub fn mode(&self) -> Mode {
        *self.mode.lock()
    }

    pub fn set_active_profile(&self, profile_name: Option<String>) {
        *self.profile_name.lock() = profile_name;
    }

    /// The last `duration_s` seconds of gate-passed audio (§4.3 `recent`),
    /// independent of whatever utterance the engine currently has open.
    /// Used by late consumers such as the calibration engine's duration
    /// bookkeeping.
    pub fn recent_audio(&self, duration_s: f64) -> Vec<f32> {
        self.ring.recent(duration_s, self.engine_config.sample_rate)
    }

    /// `GET /status` (§6 "current session stats").
    pub fn status(&self) -> StatusSnapshot {
        let last = self.last_status.lock().clone();
        StatusSnapshot {
            running: self.is_running(),
            paused: self.is_paused(),
            mode: self.mode(),
            profile_name: self.profile_name.lock().clone(),
            provider: (*self.provider_name.lock()).to_string(),
            counters: self.router.counters(),
            avg_latency_ms: *self.avg_latency_ms.lock(),
            last_text: last.text,
            last_confidence: last.confidence,
            last_is_final: last.is_final,
            last_timestamp: last.timestamp,
        }
    }

    #[cfg(test)]
    fn route_final(&self, result: &crate::model::TranscriptResult) -> crate::router::RouteResult {
        self.router.route(result)
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_event(
    event: EngineEvent,
    router: &Router,
    mode: &Mutex<Mode>,
    paused: &AtomicBool,
    provider_name: &'static str,
    paths: &SessionPaths,
    last_status: &Mutex<LastStatus>,
    avg_latency_ms: &Mutex<f64>,
) {
    match event {
        EngineEvent::Partial(partial) => {
            let payload = StatusFilePayload {
                text: &partial.text,
                confidence: partial.confidence,
                mode: mode.lock().as_str(),
                timestamp: partial.timestamp,
                is_final: false,
                provider: provider_name,
            };
            if let Err(err) = atomic_write_json(&paths.status_file, &payload) {
                warn!(error = %err, "failed to write status file");
            }
            *last_status.lock() = LastStatus {
                text: partial.text,
                confidence: partial.confidence,
                is_final: false,
                timestamp: partial.timestamp,
            };
        }
        EngineEvent::Final { result, routable, avg_latency_ms: latency } => {
            *avg_latency_ms.lock() = latency;

            // §4.9: paused suspends delivery to the router, not status
            // reporting — the transcript stream keeps flowing to callers
            // polling `GET /status`, it just never reaches the command file.
            if routable && !paused.load(Ordering::Relaxed) {
                let routed = router.route(&result);
                if let RouteAction::Execute = routed.action {
                    if let Some(text) = routed.command_text {
                        // §5 ordering guarantee 3: command write precedes
                        // the status write for the same utterance below.
                        if let Err(err) = write_command_file(&paths.command_file, &text) {
                            warn!(error = %err, "failed to write command file");
                        }
                    }
                }
            }

            let payload = StatusFilePayload {
                text: &result.text,
                confidence: result.confidence,
                mode: result.mode.as_str(),
                timestamp: result.timestamp,
                is_final: true,
                provider: provider_name,
            };
            if let Err(err) = atomic_write_json(&paths.status_file, &payload) {
                warn!(error = %err, "failed to write status file");
            }
            *last_status.lock() = LastStatus {
                text: result.text,
                confidence: result.confidence,
                is_final: true,
                timestamp: result.timestamp,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{unix_timestamp, NoiseLevel, TranscriptResult};
    use crate::provider::batch_local::{BatchLocal, ModelHandle};
    use crate::provider::stub::StubAcousticModel;
    use crate::speaking::FakeSpeakingState;

    fn coordinator() -> SessionCoordinator {
        SessionCoordinator::new(
            SessionPaths {
                command_file: PathBuf::from("/tmp/maestro-test-command.txt"),
                status_file: PathBuf::from("/tmp/maestro-test-status.json"),
                vocab_file: PathBuf::from("/tmp/maestro-test-vocab.json"),
            },
            EngineConfig::default(),
            None,
            Arc::new(FakeSpeakingState::new(false)),
            Arc::new(|| Provider::BatchLocal(BatchLocal::new(ModelHandle::new(StubAcousticModel::new())))),
            Mode::Command,
            None,
        )
    }

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

    #[test]
    fn starts_stopped_and_unpaused() {
        let session = coordinator();
        assert!(!session.is_running());
        assert!(!session.is_paused());
        assert_eq!(session.mode(), Mode::Command);
    }

    #[test]
    fn pause_and_resume_toggle_flag() {
        let session = coordinator();
        session.pause();
        assert!(session.is_paused());
        session.resume();
        assert!(!session.is_paused());
    }

    #[test]
    fn set_mode_is_observed_immediately() {
        let session = coordinator();
        session.set_mode(Mode::Dictation);
        assert_eq!(session.mode(), Mode::Dictation);
    }

    #[test]
    fn confirm_after_medium_confidence_writes_command_and_clears_pending() {
        let session = coordinator();
        let routed = session.route_final(&final_result("arm track five", 0.70));
        assert_eq!(routed.action, RouteAction::Confirm);
        session.confirm().unwrap();
        assert!(session.router.pending().is_none());
        assert_eq!(session.status().counters.confirmed, 1);
    }

    #[test]
    fn cancel_clears_pending_without_writing_a_command() {
        let session = coordinator();
        session.route_final(&final_result("mute track two", 0.70));
        session.cancel();
        assert!(session.router.pending().is_none());
        assert_eq!(session.status().counters.confirmed, 0);
    }

    #[test]
    fn status_reports_idle_defaults_before_any_transcript() {
        let session = coordinator();
        let status = session.status();
        assert!(!status.running);
        assert_eq!(status.last_text, "");
        assert_eq!(status.counters.total, 0);
    }

    #[test]
    fn recent_audio_is_empty_before_any_capture() {
        let session = coordinator();
        assert!(session.recent_audio(1.0).is_empty());
    }
}
