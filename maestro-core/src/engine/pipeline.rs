//! Blocking pipeline loop (§5 T2) — drains the capture ring buffer, runs it
//! through `CaptureGate` (C1 echo suppression) and `StreamingEngine` (C5),
//! and forwards resulting events to the session coordinator over a
//! crossbeam channel.
//!
//! Runs inside `tokio::task::spawn_blocking`, matching the teacher's
//! convention of keeping the async runtime free for I/O while the
//! VAD/provider work (which can block for tens to hundreds of ms) happens
//! on its own OS thread (§5 "Suspension points").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::audio::gate::{CaptureGate, GateDecision};
use crate::audio::resample::RateConverter;
use crate::buffering::ring::RingBuffer;
use crate::buffering::{chunk::AudioChunk, AudioConsumer, Consumer};
use crate::engine::{EngineEvent, StreamingEngine};

/// Duration of one VAD frame fed to the engine (§3: 30ms).
pub const VAD_FRAME_S: f64 = 0.03;

/// How long to sleep when the ring buffer has nothing new, to avoid
/// busy-spinning the pipeline thread.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

pub struct PipelineContext {
    pub engine: StreamingEngine,
    pub gate: CaptureGate,
    pub consumer: AudioConsumer,
    pub capture_sample_rate: u32,
    pub target_sample_rate: u32,
    pub running: Arc<AtomicBool>,
    pub events_tx: Sender<EngineEvent>,
    /// C3 (§4.3): mirrors every gate-passed frame so `recent(duration_s)`
    /// can serve "the last N seconds" to a late consumer (e.g. the
    /// calibration engine capturing the tail of an utterance) without
    /// replaying it through the VAD/engine.
    pub ring: Arc<RingBuffer>,
}

/// Runs until `running` is cleared (§5 "Cancellation and timeouts" — the
/// caller is responsible for joining this within the bounded timeout).
pub fn run(mut ctx: PipelineContext) {
    let frame_len = (VAD_FRAME_S * ctx.target_sample_rate as f64).round() as usize;
    let mut resampler = match RateConverter::new(ctx.capture_sample_rate, ctx.target_sample_rate, frame_len) {
        Ok(r) => r,
        Err(err) => {
            tracing::error!(error = %err, "failed to build rate converter, stopping pipeline");
            return;
        }
    };

    let mut raw_buf: Vec<f32> = Vec::with_capacity(frame_len * 4);
    let mut resampled_buf: Vec<f32> = Vec::new();

    info!("pipeline worker started");

    while ctx.running.load(Ordering::Relaxed) {
        let mut scratch = [0f32; 4096];
        let n = ctx.consumer.pop_slice(&mut scratch);
        if n == 0 {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }
        raw_buf.extend_from_slice(&scratch[..n]);

        let converted = resampler.process(&raw_buf);
        raw_buf.clear();
        resampled_buf.extend_from_slice(&converted);

        while resampled_buf.len() >= frame_len {
            let frame_samples: Vec<f32> = resampled_buf.drain(..frame_len).collect();
            let chunk = AudioChunk::new(frame_samples, ctx.target_sample_rate);

            let decision = ctx.gate.process(&chunk);
            if decision == GateDecision::Suppressed {
                // §I3: while the speaking flag is asserted, no frames reach
                // the engine and no finals are produced.
                continue;
            }

            // C3 sees only gate-passed audio — it must not retain the
            // assistant's own TTS tail any more than C5 does.
            ctx.ring.write(&chunk.samples);

            for event in ctx.engine.process_frame(&chunk, None) {
                debug!(kind = %event_kind(&event), "pipeline emitting engine event");
                if ctx.events_tx.send(event).is_err() {
                    // Receiver gone — session is tearing down.
                    return;
                }
            }
        }
    }

    info!(dropped_frames = ctx.gate.dropped_frames(), "pipeline worker stopped");
}

fn event_kind(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::Partial(_) => "partial",
        EngineEvent::Final { routable: true, .. } => "final",
        EngineEvent::Final { routable: false, .. } => "final(mode-switch)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::create_audio_ring;
    use crate::engine::EngineConfig;
    use crate::provider::batch_local::{BatchLocal, ModelHandle};
    use crate::provider::stub::StubAcousticModel;
    use crate::provider::Provider;
    use crate::speaking::FakeSpeakingState;
    use crate::vocab::VocabularyStore;
    use crossbeam_channel::unbounded;

    #[test]
    fn speaking_flag_suppresses_all_engine_output() {
        let (mut producer, consumer) = create_audio_ring();
        // Push enough loud samples to pass the VAD many times over.
        producer.push_slice(&vec![0.3f32; 16_000]);

        let speaking = Arc::new(FakeSpeakingState::new(true));
        let gate = CaptureGate::new(speaking);
        let provider = Provider::BatchLocal(BatchLocal::new(ModelHandle::new(StubAcousticModel::new())));
        let engine = StreamingEngine::new(EngineConfig::default(), provider, VocabularyStore::default());
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = unbounded();

        let running_clone = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            run(PipelineContext {
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

        std::thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(rx.try_iter().next().is_none(), "no events should escape while TTS is speaking");
    }

    #[test]
    fn gate_passed_audio_is_mirrored_into_the_ring_buffer() {
        let (mut producer, consumer) = create_audio_ring();
        producer.push_slice(&vec![0.0f32; 1_600]);

        let speaking = Arc::new(FakeSpeakingState::new(false));
        let gate = CaptureGate::new(speaking);
        let provider = Provider::BatchLocal(BatchLocal::new(ModelHandle::new(StubAcousticModel::new())));
        let engine = StreamingEngine::new(EngineConfig::default(), provider, VocabularyStore::default());
        let running = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = unbounded();
        let ring = Arc::new(RingBuffer::new(16_000 * 30));
        let ring_clone = Arc::clone(&ring);

        let running_clone = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            run(PipelineContext {
                engine,
                gate,
                consumer,
                capture_sample_rate: 16_000,
                target_sample_rate: 16_000,
                running: running_clone,
                events_tx: tx,
                ring: ring_clone,
            });
        });

        std::thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(ring.len() > 0, "ring buffer should have mirrored gate-passed frames");
    }
}
