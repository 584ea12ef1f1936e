//! # maestro-core
//!
//! Real-time speech-recognition core for the Maestro DAW voice assistant
//! (see `SPEC_FULL.md` at the workspace root for the full component design).
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture (C1) → CaptureGate (speaking-flag/barge-in)
//!                                        │
//!                                   EnergyVad + Segmenter (C2)
//!                                        │
//!                              StreamingEngine (C5) ──► Provider (C4)
//!                                        │                   ▲
//!                              Vocabulary & Alias (C6) ───────┘
//!                                        │
//!                                 Command Router (C7)
//! ```
//!
//! `SessionCoordinator` (C9) owns construction and lifecycle of all of the
//! above; `CalibrationSession` (C8) runs independently of a live session to
//! derive a `VoiceProfile`. The audio callback thread never blocks — all
//! provider I/O happens on the pipeline worker thread or the provider's own
//! thread (see `SPEC_FULL.md` §5).

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod calibration;
pub mod engine;
pub mod error;
pub mod files;
pub mod model;
pub mod provider;
pub mod router;
pub mod session;
pub mod speaking;
pub mod vad;
pub mod vocab;

pub use error::{Error, Result};
pub use model::{Mode, NoiseLevel, PartialTranscript, TranscriptResult, WordSegment};
pub use session::SessionCoordinator;
