//! Streaming local provider (§4.4): identical to batch local, except the
//! acoustic model is kept resident across segments rather than reset after
//! every call — the decoder's internal state (if any) carries forward,
//! which is what lets this variant serve `feed`-based partials cheaply.

use crate::error::Result;
use crate::model::{unix_timestamp, PartialTranscript, TranscriptResult};

use super::batch_local::ModelHandle;

pub struct StreamingLocal {
    model: ModelHandle,
    feed_buffer: Vec<f32>,
    feed_prompt: Vec<String>,
}

impl StreamingLocal {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            feed_buffer: Vec::new(),
            feed_prompt: Vec::new(),
        }
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.model.0.lock().warm_up()
    }

    /// Unlike `BatchLocal::transcribe`, does not reset the model — the
    /// next segment reuses whatever state this call left behind.
    pub fn transcribe(&mut self, samples: &[f32], sample_rate: u32, prompt: &[String]) -> Result<TranscriptResult> {
        self.model.0.lock().transcribe(samples, sample_rate, prompt)
    }

    pub fn reset(&mut self) {
        self.model.0.lock().reset();
    }

    /// Begin an incremental utterance: clears the accumulation buffer and
    /// remembers the boost prompt for the `poll_partial`/`finalize` calls
    /// that follow (§4.4 feed-based capability set).
    pub fn start_utterance(&mut self, prompt: &[String]) -> Result<()> {
        self.feed_buffer.clear();
        self.feed_prompt = prompt.to_vec();
        Ok(())
    }

    pub fn feed(&mut self, samples: &[f32]) -> Result<()> {
        self.feed_buffer.extend_from_slice(samples);
        Ok(())
    }

    /// Re-runs the resident model over whatever has been fed so far. There
    /// is no network round trip to avoid here, but the engine still
    /// rate-limits how often this gets called.
    pub fn poll_partial(&mut self, sample_rate: u32) -> Option<PartialTranscript> {
        if self.feed_buffer.is_empty() {
            return None;
        }
        let result = self
            .model
            .0
            .lock()
            .transcribe(&self.feed_buffer, sample_rate, &self.feed_prompt)
            .ok()?;
        Some(PartialTranscript {
            text: result.text,
            confidence: result.confidence,
            timestamp: unix_timestamp(),
        })
    }

    pub fn finalize(&mut self, sample_rate: u32) -> Result<TranscriptResult> {
        let result = self.model.0.lock().transcribe(&self.feed_buffer, sample_rate, &self.feed_prompt);
        self.feed_buffer.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubAcousticModel;

    #[test]
    fn model_stays_resident_across_calls() {
        let mut streaming = StreamingLocal::new(ModelHandle::new(StubAcousticModel::new()));
        let first = streaming.transcribe(&[0.1; 16000], 16000, &[]).unwrap();
        let second = streaming.transcribe(&[0.1; 16000], 16000, &[]).unwrap();
        assert!(first.text.contains("stub-1"));
        assert!(second.text.contains("stub-2"));
    }

    #[test]
    fn poll_partial_is_empty_until_something_has_been_fed() {
        let mut streaming = StreamingLocal::new(ModelHandle::new(StubAcousticModel::new()));
        streaming.start_utterance(&[]).unwrap();
        assert!(streaming.poll_partial(16000).is_none());
    }

    #[test]
    fn feed_then_poll_partial_reflects_accumulated_samples() {
        let mut streaming = StreamingLocal::new(ModelHandle::new(StubAcousticModel::new()));
        streaming.start_utterance(&[]).unwrap();
        streaming.feed(&[0.1; 8000]).unwrap();
        let partial = streaming.poll_partial(16000).expect("expected a partial once samples are fed");
        assert!(partial.text.contains("stub-1"));
    }

    #[test]
    fn finalize_clears_the_feed_buffer_for_the_next_utterance() {
        let mut streaming = StreamingLocal::new(ModelHandle::new(StubAcousticModel::new()));
        streaming.start_utterance(&[]).unwrap();
        streaming.feed(&[0.1; 8000]).unwrap();
        streaming.finalize(16000).unwrap();
        assert!(streaming.poll_partial(16000).is_none());
    }
}
