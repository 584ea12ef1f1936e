//! Environment-tunable daemon configuration (§6 "Environment-tunables").
//!
//! Follows the teacher's `dictum-app/src/settings.rs` pattern: read once at
//! startup, `normalize_*` helpers clamp out-of-range values to a documented
//! default rather than failing, and nothing here can abort process start.

use std::path::PathBuf;

use maestro_core::engine::{EngineConfig, SecondPassConfig};

/// Which acoustic-model backend to construct (§6 `ASR_PROVIDER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    StreamingLocal,
    StreamingRemote,
}

impl ProviderKind {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "streaming_local" => ProviderKind::StreamingLocal,
            "streaming_remote" => ProviderKind::StreamingRemote,
            _ => ProviderKind::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub provider: ProviderKind,
    /// Retained for parity with spec.md's enumerated tunables; the
    /// adaptive `EnergyVad` (§4.2) has no fixed-threshold knob to feed this
    /// into — see DESIGN.md.
    pub vad_rms_threshold: u32,
    pub vad_min_interval_s: f64,
    pub engine: EngineConfig,
    pub post_speech_mute_s: f64,
    pub second_pass_model: Option<String>,
    pub http_bind: String,
    pub device_preference: Option<String>,
    pub profile_name: Option<String>,
    pub command_file: PathBuf,
    pub status_file: PathBuf,
    pub vocab_file: PathBuf,
    pub speaking_flag_file: PathBuf,
    pub barge_in_file: PathBuf,
    pub profiles_dir: PathBuf,
}

impl DaemonConfig {
    /// Read every variable from the environment, clamping anything
    /// out-of-range instead of failing startup.
    pub fn from_env() -> Self {
        let data_dir = env_path("MAESTRO_DATA_DIR", ".");

        let mut engine = EngineConfig::default();
        engine.partial_throttle_s = normalize_partial_throttle(env_f64("PARTIAL_THROTTLE_S", engine.partial_throttle_s));
        engine.max_silence_s = normalize_utterance_end(env_f64("UTTERANCE_END_MS", engine.max_silence_s * 1000.0) / 1000.0);
        engine.second_pass = SecondPassConfig {
            enabled: std::env::var("SECOND_PASS_MODEL").is_ok(),
            max_confidence: normalize_unit(env_f32("SECOND_PASS_MAX_CONF", engine.second_pass.max_confidence)),
            min_improvement: normalize_unit(env_f32("SECOND_PASS_MIN_IMPROVEMENT", engine.second_pass.min_improvement)),
            max_audio_s: env_f64("SECOND_PASS_MAX_AUDIO_S", engine.second_pass.max_audio_s).max(0.0),
        };

        Self {
            provider: ProviderKind::parse(&std::env::var("ASR_PROVIDER").unwrap_or_default()),
            vad_rms_threshold: env_u32("VAD_RMS_THRESHOLD", 400),
            vad_min_interval_s: env_f64("VAD_MIN_INTERVAL_S", 0.05).max(0.0),
            engine,
            post_speech_mute_s: env_f64("POST_SPEECH_MUTE_S", 1.0).max(0.0),
            second_pass_model: std::env::var("SECOND_PASS_MODEL").ok(),
            http_bind: std::env::var("MAESTRO_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8420".into()),
            device_preference: std::env::var("MAESTRO_INPUT_DEVICE").ok(),
            profile_name: std::env::var("MAESTRO_PROFILE").ok(),
            command_file: data_dir.join("command.txt"),
            status_file: data_dir.join("status.json"),
            vocab_file: data_dir.join("vocabulary.json"),
            speaking_flag_file: data_dir.join("speaking.flag"),
            barge_in_file: data_dir.join("barge_in.json"),
            profiles_dir: data_dir.join("profiles"),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn normalize_partial_throttle(raw: f64) -> f64 {
    raw.clamp(0.0, 5.0)
}

fn normalize_utterance_end(raw_s: f64) -> f64 {
    raw_s.clamp(0.05, 10.0)
}

fn normalize_unit(raw: f32) -> f32 {
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_known_values_and_defaults_to_local() {
        assert_eq!(ProviderKind::parse("streaming_remote"), ProviderKind::StreamingRemote);
        assert_eq!(ProviderKind::parse("streaming_local"), ProviderKind::StreamingLocal);
        assert_eq!(ProviderKind::parse("local"), ProviderKind::Local);
        assert_eq!(ProviderKind::parse("nonsense"), ProviderKind::Local);
        assert_eq!(ProviderKind::parse(""), ProviderKind::Local);
    }

    #[test]
    fn normalize_partial_throttle_clamps_out_of_range() {
        assert_eq!(normalize_partial_throttle(-1.0), 0.0);
        assert_eq!(normalize_partial_throttle(100.0), 5.0);
        assert_eq!(normalize_partial_throttle(0.15), 0.15);
    }

    #[test]
    fn normalize_unit_clamps_to_zero_one() {
        assert_eq!(normalize_unit(-0.5), 0.0);
        assert_eq!(normalize_unit(1.5), 1.0);
    }
}
