//! TTS speaking-state and barge-in signalling (§4.1, §6).
//!
//! The ASR core never drives the TTS subsystem directly — it only observes a
//! sentinel file the TTS layer asserts while it talks, and writes a second
//! sentinel so the TTS layer can cancel mid-utterance when the user barges
//! in. Per Design Notes §9, the file-based contract is preserved (it is the
//! minimum-coupling surface to an external TTS process) but hidden behind a
//! `SpeakingState` trait so tests can substitute a programmable flag instead
//! of touching the filesystem.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::unix_timestamp;

/// How stale a speaking-flag file's mtime must be before it is treated as
/// cleared even though the file still exists (§6).
pub const STALE_FLAG_AGE: Duration = Duration::from_secs(30);

/// Observes whether the external TTS subsystem is currently speaking.
///
/// Implementations are polled, never awaited — the audio callback and
/// provider I/O sites check this synchronously on every frame/send.
pub trait SpeakingState: Send + Sync + 'static {
    /// `true` if TTS is currently speaking (flag asserted and not stale).
    fn is_speaking(&self) -> bool;

    /// Write the barge-in signal (§6), rate-limited by the caller.
    fn signal_barge_in(&self, rms: f32) -> Result<()>;
}

/// Barge-in signal payload written to the external surface (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BargeInSignal {
    pub timestamp: f64,
    pub rms: f32,
}

/// Filesystem-backed `SpeakingState`: existence of `speaking_flag_path`
/// (with a fresh mtime) means TTS is active.
pub struct FileSpeakingState {
    speaking_flag_path: PathBuf,
    barge_in_path: PathBuf,
}

impl FileSpeakingState {
    pub fn new(speaking_flag_path: impl Into<PathBuf>, barge_in_path: impl Into<PathBuf>) -> Self {
        Self {
            speaking_flag_path: speaking_flag_path.into(),
            barge_in_path: barge_in_path.into(),
        }
    }
}

impl SpeakingState for FileSpeakingState {
    fn is_speaking(&self) -> bool {
        flag_is_asserted(&self.speaking_flag_path)
    }

    fn signal_barge_in(&self, rms: f32) -> Result<()> {
        let payload = BargeInSignal {
            timestamp: unix_timestamp(),
            rms,
        };
        crate::files::atomic_write_json(&self.barge_in_path, &payload)
    }
}

/// Shared staleness check: a flag file counts as asserted only if it exists
/// and its mtime is no older than `STALE_FLAG_AGE` (§6, §7 `stale_flag`).
fn flag_is_asserted(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        // Can't determine age — conservatively treat as asserted, matching
        // the "fail toward muting" posture of the echo-suppression gate.
        return true;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < STALE_FLAG_AGE,
        Err(_) => true,
    }
}

/// In-memory double for tests — avoids touching the filesystem.
#[derive(Default)]
pub struct FakeSpeakingState {
    speaking: parking_lot::Mutex<bool>,
    signals: parking_lot::Mutex<Vec<BargeInSignal>>,
}

impl FakeSpeakingState {
    pub fn new(speaking: bool) -> Self {
        Self {
            speaking: parking_lot::Mutex::new(speaking),
            signals: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn set_speaking(&self, speaking: bool) {
        *self.speaking.lock() = speaking;
    }

    pub fn signals(&self) -> Vec<BargeInSignal> {
        self.signals.lock().clone()
    }
}

impl SpeakingState for FakeSpeakingState {
    fn is_speaking(&self) -> bool {
        *self.speaking.lock()
    }

    fn signal_barge_in(&self, rms: f32) -> Result<()> {
        self.signals.lock().push(BargeInSignal {
            timestamp: unix_timestamp(),
            rms,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_is_not_speaking() {
        let dir = tempdir();
        let state = FileSpeakingState::new(dir.join("speaking"), dir.join("barge_in.json"));
        assert!(!state.is_speaking());
    }

    #[test]
    fn fresh_flag_file_is_speaking() {
        let dir = tempdir();
        let flag = dir.join("speaking");
        fs::write(&flag, b"").unwrap();
        let state = FileSpeakingState::new(flag, dir.join("barge_in.json"));
        assert!(state.is_speaking());
    }

    #[test]
    fn stale_flag_file_is_not_speaking() {
        let dir = tempdir();
        let flag = dir.join("speaking");
        fs::write(&flag, b"").unwrap();
        let old = SystemTime::now() - Duration::from_secs(31);
        set_mtime(&flag, old);
        let state = FileSpeakingState::new(flag, dir.join("barge_in.json"));
        assert!(!state.is_speaking());
    }

    #[test]
    fn barge_in_signal_is_written_as_json() {
        let dir = tempdir();
        let barge_in = dir.join("barge_in.json");
        let state = FileSpeakingState::new(dir.join("speaking"), &barge_in);
        state.signal_barge_in(0.42).unwrap();
        let contents = fs::read_to_string(&barge_in).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!((value["rms"].as_f64().unwrap() - 0.42).abs() < 1e-6);
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("maestro-core-test-{}", rand_suffix()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn rand_suffix() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
            + SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos() as u64
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }
}
