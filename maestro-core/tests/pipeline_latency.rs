//! End-to-end latency check for the capture-ring -> gate -> engine path
//! (§4.5: the first partial should land well under the round-trip budget
//! the session coordinator expects).
//!
//! Drives `engine::pipeline::run` exactly as `SessionCoordinator::start`
//! does, but with a synthetic provider that sleeps a fixed, small delay
//! instead of doing real inference, so the measured time-to-first-word is a
//! property of the pipeline plumbing and not of a model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;

use maestro_core::audio::gate::CaptureGate;
use maestro_core::buffering::create_audio_ring;
use maestro_core::buffering::ring::RingBuffer;
use maestro_core::engine::pipeline::{self, PipelineContext};
use maestro_core::engine::{EngineConfig, EngineEvent, StreamingEngine};
use maestro_core::error::Result;
use maestro_core::model::TranscriptResult;
use maestro_core::provider::batch_local::{BatchLocal, ModelHandle};
use maestro_core::provider::{AcousticModel, Provider};
use maestro_core::speaking::FakeSpeakingState;
use maestro_core::vocab::VocabularyStore;

/// Stands in for a real acoustic model: returns a fixed echo after a fixed
/// delay, so the test measures pipeline overhead rather than inference time.
struct DelayModel {
    delay: Duration,
}

impl DelayModel {
    fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl AcousticModel for DelayModel {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(&mut self, _samples: &[f32], _sample_rate: u32, _prompt: &[String]) -> Result<TranscriptResult> {
        thread::sleep(self.delay);
        Ok(TranscriptResult::with_confidence(
            "latency check".to_string(),
            0.9,
            maestro_core::Mode::Command,
            None,
            maestro_core::NoiseLevel::Low,
            maestro_core::model::unix_timestamp(),
            false,
        ))
    }

    fn reset(&mut self) {}
}

fn recv_with_timeout(rx: &crossbeam_channel::Receiver<EngineEvent>, timeout: Duration) -> EngineEvent {
    rx.recv_timeout(timeout).expect("timed out waiting for an engine event")
}

#[test]
fn first_partial_latency_stays_under_budget() {
    let (mut producer, consumer) = create_audio_ring();
    // Loud, sustained samples so the adaptive VAD confirms speech almost
    // immediately and keeps the segmenter open for the whole run.
    producer.push_slice(&vec![0.3f32; 32_000]);

    let speaking = Arc::new(FakeSpeakingState::new(false));
    let gate = CaptureGate::new(speaking);

    let provider = Provider::BatchLocal(BatchLocal::new(ModelHandle::new(DelayModel::new(Duration::from_millis(20)))));
    let engine = StreamingEngine::new(
        EngineConfig {
            min_speech_s: 0.06,
            max_silence_s: 0.5,
            vad_frame_s: 0.03,
            partial_interval_ms: 0,
            ..EngineConfig::default()
        },
        provider,
        VocabularyStore::default(),
    );

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = unbounded();

    let running_clone = Arc::clone(&running);
    let start = Instant::now();
    let handle = thread::spawn(move || {
        pipeline::run(PipelineContext {
            engine,
            gate,
            consumer,
            capture_sample_rate: 16_000,
            target_sample_rate: 16_000,
            running: running_clone,
            events_tx: tx,
            ring: Arc::new(RingBuffer::new(16_000 * 30)),
        });
    });

    let first = recv_with_timeout(&rx, Duration::from_secs(2));
    let elapsed = start.elapsed();

    running.store(false, Ordering::Relaxed);
    handle.join().expect("pipeline thread panicked");

    assert!(matches!(first, EngineEvent::Partial(_)), "expected a partial transcript first");
    assert!(
        elapsed < Duration::from_millis(500),
        "time-to-first-partial too high: {elapsed:?} (budget < 500ms)"
    );
}
