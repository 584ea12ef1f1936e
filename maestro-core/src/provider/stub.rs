//! `StubAcousticModel` — placeholder backend that echoes metadata without
//! real inference. Grounded on the teacher's development-time echo stub;
//! useful for exercising the full engine/router/session path in tests
//! without a real model present.

use tracing::debug;

use crate::error::Result;
use crate::model::{Mode, NoiseLevel, TranscriptResult, WordSegment};

use super::AcousticModel;

pub struct StubAcousticModel {
    utterance_count: u32,
}

impl StubAcousticModel {
    pub fn new() -> Self {
        Self { utterance_count: 0 }
    }
}

impl Default for StubAcousticModel {
    fn default() -> Self {
        Self::new()
    }
}

impl AcousticModel for StubAcousticModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubAcousticModel::warm_up — no-op");
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32], sample_rate: u32, _prompt: &[String]) -> Result<TranscriptResult> {
        if samples.len() < 160 {
            return Ok(TranscriptResult::empty(
                Mode::Command,
                None,
                crate::model::unix_timestamp(),
                true,
            ));
        }
        self.utterance_count += 1;
        let text = format!(
            "[stub-{}: {} samples @ {} Hz]",
            self.utterance_count,
            samples.len(),
            sample_rate
        );
        let words = vec![WordSegment {
            word: text.clone(),
            start_s: 0.0,
            end_s: samples.len() as f64 / sample_rate as f64,
            confidence: 1.0,
        }];
        Ok(TranscriptResult::from_words(
            text,
            words,
            Mode::Command,
            None,
            NoiseLevel::Low,
            crate::model::unix_timestamp(),
            true,
        ))
    }

    fn reset(&mut self) {
        debug!("StubAcousticModel::reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_segment_yields_empty_result() {
        let mut model = StubAcousticModel::new();
        let result = model.transcribe(&[0.0; 10], 16000, &[]).unwrap();
        assert!(result.text.is_empty());
    }

    #[test]
    fn long_segment_yields_deterministic_echo() {
        let mut model = StubAcousticModel::new();
        let result = model.transcribe(&[0.1; 16000], 16000, &[]).unwrap();
        assert!(result.text.contains("stub-1"));
        assert_eq!(result.confidence, 1.0);
    }
}
