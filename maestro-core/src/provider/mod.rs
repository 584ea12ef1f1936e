//! Provider abstraction (C4, §4.4).
//!
//! Polymorphic over the capability set `{ transcribe(segment), feed(frame),
//! finals(), partials() }`, with a tagged variant chosen once per session
//! (Design Notes §9 "Polymorphism over recognizers") rather than duck
//! typing between backend SDKs. The acoustic model itself — the thing that
//! turns PCM into words — stays an external-collaborator trait
//! (`AcousticModel`): this crate owns the session/streaming/error-handling
//! shape around it, not the model weights.

pub mod batch_local;
pub mod stub;
pub mod streaming_local;

#[cfg(feature = "remote-provider")]
pub mod streaming_remote;

use crate::error::Result;
use crate::model::{PartialTranscript, TranscriptResult};

pub use batch_local::BatchLocal;
pub use stub::StubAcousticModel;
pub use streaming_local::StreamingLocal;

#[cfg(feature = "remote-provider")]
pub use streaming_remote::StreamingRemote;

/// The acoustic model — an external collaborator. Implementations may be
/// stateful (beam search caches, RNN hidden states); all mutation is
/// serialised by the caller.
pub trait AcousticModel: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference to populate
    /// caches. Called once at session start.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe a complete utterance segment, given the current boost
    /// prompt (§4.6 role 1).
    fn transcribe(&mut self, samples: &[f32], sample_rate: u32, prompt: &[String]) -> Result<TranscriptResult>;

    /// Reset decoder state between utterances (batch variant) or sessions.
    fn reset(&mut self);
}

/// Error taxonomy for provider calls (§4.4, §7). The engine treats `Auth`
/// as fatal (surface + stop) and everything else as retryable with bounded
/// exponential backoff, maximum 3 attempts per utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    Network,
    SchemaMismatch,
    EmptyResult,
    RateLimited,
}

impl ProviderErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, ProviderErrorKind::Auth)
    }
}

/// Tagged variant over the three provider shapes (§4.4, Design Notes §9).
/// Construction chooses the variant once per session.
pub enum Provider {
    BatchLocal(BatchLocal),
    StreamingLocal(StreamingLocal),
    #[cfg(feature = "remote-provider")]
    StreamingRemote(StreamingRemote),
}

impl Provider {
    pub fn warm_up(&mut self) -> Result<()> {
        match self {
            Provider::BatchLocal(p) => p.warm_up(),
            Provider::StreamingLocal(p) => p.warm_up(),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.warm_up(),
        }
    }

    /// Run one utterance segment to a final transcript.
    pub fn transcribe(&mut self, samples: &[f32], sample_rate: u32, prompt: &[String]) -> Result<TranscriptResult> {
        match self {
            Provider::BatchLocal(p) => p.transcribe(samples, sample_rate, prompt),
            Provider::StreamingLocal(p) => p.transcribe(samples, sample_rate, prompt),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.transcribe(samples, sample_rate, prompt),
        }
    }

    /// Whether this variant supports `feed`-based incremental partials
    /// (§4.4 capability set); batch-local does not, so the engine must
    /// fall back to re-running `transcribe` on the growing in-flight
    /// buffer for partials.
    pub fn supports_feed(&self) -> bool {
        match self {
            Provider::BatchLocal(_) => false,
            Provider::StreamingLocal(_) => true,
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(_) => true,
        }
    }

    pub fn reset(&mut self) {
        match self {
            Provider::BatchLocal(p) => p.reset(),
            Provider::StreamingLocal(p) => p.reset(),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.reset(),
        }
    }

    /// Begin an incremental utterance (§4.4 feed-based capability set).
    /// Callers must check `supports_feed` first — calling this on a
    /// provider that doesn't support it is a caller bug.
    pub fn start_utterance(&mut self, prompt: &[String]) -> Result<()> {
        match self {
            Provider::BatchLocal(_) => unreachable!("start_utterance called on a non-feed provider"),
            Provider::StreamingLocal(p) => p.start_utterance(prompt),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.start_utterance(prompt),
        }
    }

    /// Forward one frame's worth of samples to the in-progress incremental
    /// utterance. Must only be called after `start_utterance`.
    pub fn feed(&mut self, samples: &[f32]) -> Result<()> {
        match self {
            Provider::BatchLocal(_) => unreachable!("feed called on a non-feed provider"),
            Provider::StreamingLocal(p) => p.feed(samples),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.feed(samples),
        }
    }

    /// Non-blocking peek at the latest partial produced for fed samples so
    /// far, or `None` if nothing new is ready yet.
    pub fn poll_partial(&mut self, sample_rate: u32) -> Option<PartialTranscript> {
        match self {
            Provider::BatchLocal(_) => unreachable!("poll_partial called on a non-feed provider"),
            Provider::StreamingLocal(p) => p.poll_partial(sample_rate),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.poll_partial(),
        }
    }

    /// Block for the final transcript of the utterance started with
    /// `start_utterance` and built up via `feed`.
    pub fn finalize(&mut self, sample_rate: u32) -> Result<TranscriptResult> {
        match self {
            Provider::BatchLocal(_) => unreachable!("finalize called on a non-feed provider"),
            Provider::StreamingLocal(p) => p.finalize(sample_rate),
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(p) => p.finalize(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::BatchLocal(_) => "local",
            Provider::StreamingLocal(_) => "streaming_local",
            #[cfg(feature = "remote-provider")]
            Provider::StreamingRemote(_) => "streaming_remote",
        }
    }
}
