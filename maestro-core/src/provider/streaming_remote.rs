//! Streaming remote provider (§4.4): a websocket-backed recognizer. Owns
//! its own OS thread running a dedicated single-thread tokio runtime (§5
//! T3 "the provider's own I/O... on its own thread or task") so the
//! synchronous `Provider` call shape never blocks the streaming engine's
//! worker on network I/O directly — it just waits on a channel.
//!
//! Protocol: a JSON `start` message carrying the keyword-boost list opens
//! the session; PCM16 binary frames follow; the server replies with JSON
//! `partial`/`final`/`error` messages. Partials are rate-limited to
//! `PARTIAL_THROTTLE`; finals and partials that arrive while the speaking
//! flag is asserted are discarded rather than delivered (§4.4).

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::model::{unix_timestamp, Mode, NoiseLevel, PartialTranscript, TranscriptResult};
use crate::speaking::SpeakingState;

use super::ProviderErrorKind;

/// Bounded retry budget per utterance (§4.4, §7).
pub const MAX_ATTEMPTS: u32 = 3;
/// Partial emission is throttled to no faster than this (§3).
pub const PARTIAL_THROTTLE: Duration = Duration::from_millis(150);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct StreamingRemoteConfig {
    pub ws_url: String,
    pub api_key: String,
}

enum Command {
    Start { boost_words: Vec<String> },
    Frame { samples: Vec<f32> },
    EndUtterance,
}

enum WorkerEvent {
    Partial(PartialTranscript),
    Final(TranscriptResult),
    Error(ProviderErrorKind, String),
}

pub struct StreamingRemote {
    cmd_tx: std_mpsc::Sender<Command>,
    event_rx: std_mpsc::Receiver<WorkerEvent>,
    speaking: Arc<dyn SpeakingState>,
    last_partial_emit: Option<Instant>,
    worker: Option<JoinHandle<()>>,
}

impl StreamingRemote {
    pub fn new(config: StreamingRemoteConfig, speaking: Arc<dyn SpeakingState>) -> Self {
        let (cmd_tx, cmd_rx) = std_mpsc::channel::<Command>();
        let (event_tx, event_rx) = std_mpsc::channel::<WorkerEvent>();

        let worker = std::thread::Builder::new()
            .name("maestro-streaming-remote".into())
            .spawn(move || run_worker(config, cmd_rx, event_tx))
            .expect("failed to spawn streaming-remote worker thread");

        Self {
            cmd_tx,
            event_rx,
            speaking,
            last_partial_emit: None,
            worker: Some(worker),
        }
    }

    pub fn warm_up(&mut self) -> Result<()> {
        // The websocket connects lazily on the first `Start` command —
        // nothing to do eagerly here beyond confirming the worker is alive.
        Ok(())
    }

    /// Run one full utterance in a single shot: open a connection, send the
    /// boost-prompt handshake, stream the samples, and block for the final.
    /// Correct for one-off full-buffer calls such as second-pass rescoring
    /// (§4.5), where a single round trip over the whole utterance is what's
    /// wanted. The streaming engine's per-utterance partial/final path uses
    /// `start_utterance`/`feed`/`poll_partial`/`finalize` below instead, so
    /// the connection and boost handshake are reused for the utterance's
    /// whole lifetime rather than repeated on every ~200ms partial probe.
    pub fn transcribe(&mut self, samples: &[f32], _sample_rate: u32, prompt: &[String]) -> Result<TranscriptResult> {
        self.start_utterance(prompt)?;
        self.feed(samples)?;
        self.finalize()
    }

    pub fn start_utterance(&mut self, boost_words: &[String]) -> Result<()> {
        self.cmd_tx
            .send(Command::Start { boost_words: boost_words.to_vec() })
            .map_err(channel_closed)
    }

    pub fn feed(&mut self, samples: &[f32]) -> Result<()> {
        self.cmd_tx
            .send(Command::Frame { samples: samples.to_vec() })
            .map_err(channel_closed)
    }

    pub fn finalize(&mut self) -> Result<TranscriptResult> {
        self.cmd_tx.send(Command::EndUtterance).map_err(channel_closed)?;
        loop {
            match self.event_rx.recv() {
                Ok(WorkerEvent::Final(result)) => {
                    if self.speaking.is_speaking() {
                        return Ok(TranscriptResult::empty(result.mode, result.profile_name, result.timestamp, true));
                    }
                    return Ok(result);
                }
                Ok(WorkerEvent::Partial(_)) => continue,
                Ok(WorkerEvent::Error(kind, message)) => return Err(classify_error(kind, message)),
                Err(_) => return Err(Error::ProviderTransient("worker channel closed".into())),
            }
        }
    }

    /// Non-blocking poll for the latest partial, rate-limited and
    /// suppressed while TTS is speaking (§4.4).
    pub fn poll_partial(&mut self) -> Option<PartialTranscript> {
        if self.speaking.is_speaking() {
            while self.event_rx.try_recv().is_ok() {}
            return None;
        }
        let mut latest = None;
        while let Ok(event) = self.event_rx.try_recv() {
            if let WorkerEvent::Partial(p) = event {
                latest = Some(p);
            }
        }
        let partial = latest?;
        if let Some(last) = self.last_partial_emit {
            if last.elapsed() < PARTIAL_THROTTLE {
                return None;
            }
        }
        self.last_partial_emit = Some(Instant::now());
        Some(partial)
    }

    pub fn reset(&mut self) {
        self.last_partial_emit = None;
    }
}

fn channel_closed<T>(_: std_mpsc::SendError<T>) -> Error {
    Error::ProviderTransient("worker channel closed".into())
}

impl Drop for StreamingRemote {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn classify_error(kind: ProviderErrorKind, message: String) -> Error {
    match kind {
        ProviderErrorKind::Auth => Error::ProviderAuthFailed(message),
        ProviderErrorKind::SchemaMismatch | ProviderErrorKind::EmptyResult => Error::SchemaViolation(message),
        ProviderErrorKind::Network | ProviderErrorKind::RateLimited => Error::ProviderTransient(message),
    }
}

fn run_worker(config: StreamingRemoteConfig, cmd_rx: std_mpsc::Receiver<Command>, event_tx: std_mpsc::Sender<WorkerEvent>) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            let _ = event_tx.send(WorkerEvent::Error(ProviderErrorKind::Network, err.to_string()));
            return;
        }
    };

    rt.block_on(async move {
        let mut socket: Option<WsStream> = None;
        while let Ok(command) = cmd_rx.recv() {
            match command {
                Command::Start { boost_words } => match connect_with_retry(&config, &boost_words).await {
                    Ok(stream) => socket = Some(stream),
                    Err((kind, message)) => {
                        let _ = event_tx.send(WorkerEvent::Error(kind, message));
                    }
                },
                Command::Frame { samples } => {
                    if let Some(stream) = socket.as_mut() {
                        if let Err(err) = send_frame(stream, &samples).await {
                            let _ = event_tx.send(WorkerEvent::Error(ProviderErrorKind::Network, err.to_string()));
                        }
                    }
                }
                Command::EndUtterance => {
                    if let Some(stream) = socket.as_mut() {
                        match await_final(stream, &event_tx).await {
                            Ok(result) => {
                                let _ = event_tx.send(WorkerEvent::Final(result));
                            }
                            Err((kind, message)) => {
                                let _ = event_tx.send(WorkerEvent::Error(kind, message));
                            }
                        }
                    } else {
                        let _ = event_tx.send(WorkerEvent::Error(
                            ProviderErrorKind::Network,
                            "no active connection".into(),
                        ));
                    }
                }
            }
        }
    });
}

async fn connect_with_retry(
    config: &StreamingRemoteConfig,
    boost_words: &[String],
) -> std::result::Result<WsStream, (ProviderErrorKind, String)> {
    let mut last_err = (ProviderErrorKind::Network, "connection failed".to_string());
    for attempt in 0..MAX_ATTEMPTS {
        match connect_once(config, boost_words).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if err.0.is_fatal() {
                    return Err(err);
                }
                last_err = err;
                let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }
    }
    Err(last_err)
}

async fn connect_once(
    config: &StreamingRemoteConfig,
    boost_words: &[String],
) -> std::result::Result<WsStream, (ProviderErrorKind, String)> {
    let (mut stream, response) = tokio_tungstenite::connect_async(&config.ws_url)
        .await
        .map_err(|err| (ProviderErrorKind::Network, err.to_string()))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err((ProviderErrorKind::Auth, format!("authentication rejected: {status}")));
    }

    // Keyword-boost list is sent once, at session start (§4.4).
    let start_message = json!({
        "type": "start",
        "api_key": config.api_key,
        "keywords": boost_words,
    });
    stream
        .send(Message::Text(start_message.to_string()))
        .await
        .map_err(|err| (ProviderErrorKind::Network, err.to_string()))?;

    Ok(stream)
}

async fn send_frame(stream: &mut WsStream, samples: &[f32]) -> std::result::Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let pcm = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }
    stream.send(Message::Binary(bytes)).await
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RemoteMessage {
    Partial {
        text: String,
        confidence: f32,
    },
    Final {
        text: String,
        confidence: f32,
    },
    Error {
        code: String,
        message: String,
    },
}

async fn await_final(
    stream: &mut WsStream,
    event_tx: &std_mpsc::Sender<WorkerEvent>,
) -> std::result::Result<TranscriptResult, (ProviderErrorKind, String)> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<RemoteMessage>(&text) {
                Ok(RemoteMessage::Partial { text, confidence }) => {
                    let _ = event_tx.send(WorkerEvent::Partial(PartialTranscript {
                        text,
                        confidence,
                        timestamp: unix_timestamp(),
                    }));
                }
                Ok(RemoteMessage::Final { text, confidence }) => {
                    if text.is_empty() {
                        return Err((ProviderErrorKind::EmptyResult, "empty final transcript".into()));
                    }
                    return Ok(TranscriptResult::with_confidence(
                        text,
                        confidence,
                        Mode::Command,
                        None,
                        NoiseLevel::Low,
                        unix_timestamp(),
                        true,
                    ));
                }
                Ok(RemoteMessage::Error { code, message }) => {
                    let kind = match code.as_str() {
                        "auth_failed" => ProviderErrorKind::Auth,
                        "rate_limited" => ProviderErrorKind::RateLimited,
                        _ => ProviderErrorKind::Network,
                    };
                    return Err((kind, message));
                }
                Err(err) => return Err((ProviderErrorKind::SchemaMismatch, err.to_string())),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err((ProviderErrorKind::EmptyResult, "connection closed before final".into()));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err((ProviderErrorKind::Network, err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_maps_auth_to_fatal_variant() {
        let err = classify_error(ProviderErrorKind::Auth, "denied".into());
        assert!(matches!(err, Error::ProviderAuthFailed(_)));
    }

    #[test]
    fn classify_error_maps_network_to_transient() {
        let err = classify_error(ProviderErrorKind::Network, "timeout".into());
        assert!(matches!(err, Error::ProviderTransient(_)));
    }
}
