//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! Window sizing and the segmentation thresholds are deliberately
//! configuration rather than constants: the right values depend on microphone
//! quality and how aggressively a deployment wants to elide silence.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub segmenter: SegmenterConfig,
    pub denoise: DenoiseConfig,
    pub transcription: TranscriptionConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Ingestion audio format and window sizing.
///
/// ## Fields:
/// - `sample_rate`: fixed ingestion rate in Hz; clients must capture at this rate
/// - `buffer_min_seconds`: minimum buffered audio before a window is released
///   to the segmenter (enough context for reliable classification)
/// - `buffer_max_seconds`: hard cap on buffered audio; a carried tail that
///   reaches this size is force-resolved so the buffer stays bounded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_min_seconds: f64,
    pub buffer_max_seconds: f64,
}

/// Speech segmentation thresholds.
///
/// ## Fields:
/// - `rms_threshold`: frame RMS above this classifies as speech (0.0 to 1.0)
/// - `frame_ms`: classifier frame length in milliseconds
/// - `min_speech_ms`: spans shorter than this are discarded as noise spikes
/// - `min_silence_ms`: spans separated by a gap shorter than this are merged
///   into one utterance; a span not yet followed by this much silence is
///   carried into the next window as an unresolved tail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    pub rms_threshold: f32,
    pub frame_ms: u32,
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,
}

/// Noise reduction settings for the default reducer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiseConfig {
    /// Moving-average window in samples (odd, >= 1); 1 disables smoothing
    pub smoothing_window: usize,
}

/// External transcription capability settings.
///
/// The API key is not configuration: it is read from the `OPENAI_API_KEY`
/// environment variable at startup so it never lands in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub endpoint: String,
    pub model: String,
    pub request_timeout_seconds: u64,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: maximum simultaneously connected clients
/// - `max_pending_frames`: per-session backlog of inbound frames; when the
///   pipeline lags this far behind, frame consumption is suspended rather
///   than dropping audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub max_pending_frames: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 16000,
                buffer_min_seconds: 1.5,
                buffer_max_seconds: 5.0,
            },
            segmenter: SegmenterConfig {
                rms_threshold: 0.01,
                frame_ms: 30,
                min_speech_ms: 250,
                min_silence_ms: 1000,
            },
            denoise: DenoiseConfig {
                smoothing_window: 3,
            },
            transcription: TranscriptionConfig {
                endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                model: "whisper-1".to_string(),
                request_timeout_seconds: 30,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
                max_pending_frames: 64,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly set bare HOST/PORT
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors at startup prevents a session pipeline
    /// from being constructed with a zero-length window or an unbounded
    /// backlog.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.audio.buffer_min_seconds <= 0.0 {
            return Err(anyhow::anyhow!("Minimum buffer duration must be positive"));
        }

        if self.audio.buffer_max_seconds < self.audio.buffer_min_seconds {
            return Err(anyhow::anyhow!(
                "Maximum buffer duration must be >= minimum buffer duration"
            ));
        }

        if !(0.0..=1.0).contains(&self.segmenter.rms_threshold) {
            return Err(anyhow::anyhow!("RMS threshold must be within [0.0, 1.0]"));
        }

        if self.segmenter.frame_ms == 0 {
            return Err(anyhow::anyhow!("Segmenter frame length must be greater than 0"));
        }

        if self.denoise.smoothing_window == 0 || self.denoise.smoothing_window % 2 == 0 {
            return Err(anyhow::anyhow!("Smoothing window must be odd and >= 1"));
        }

        if self.transcription.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Transcription timeout must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.max_pending_frames == 0 {
            return Err(anyhow::anyhow!("Max pending frames must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// Only the fields present in the JSON are touched, so a request like
    /// `{"segmenter": {"min_silence_ms": 750}}` adjusts a single threshold.
    /// Live sessions keep the configuration they were created with; updates
    /// apply to sessions opened afterwards.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_u64()) {
                self.audio.sample_rate = rate as u32;
            }
            if let Some(min) = audio.get("buffer_min_seconds").and_then(|v| v.as_f64()) {
                self.audio.buffer_min_seconds = min;
            }
            if let Some(max) = audio.get("buffer_max_seconds").and_then(|v| v.as_f64()) {
                self.audio.buffer_max_seconds = max;
            }
        }

        if let Some(segmenter) = partial.get("segmenter") {
            if let Some(threshold) = segmenter.get("rms_threshold").and_then(|v| v.as_f64()) {
                self.segmenter.rms_threshold = threshold as f32;
            }
            if let Some(frame) = segmenter.get("frame_ms").and_then(|v| v.as_u64()) {
                self.segmenter.frame_ms = frame as u32;
            }
            if let Some(speech) = segmenter.get("min_speech_ms").and_then(|v| v.as_u64()) {
                self.segmenter.min_speech_ms = speech as u32;
            }
            if let Some(silence) = segmenter.get("min_silence_ms").and_then(|v| v.as_u64()) {
                self.segmenter.min_silence_ms = silence as u32;
            }
        }

        if let Some(transcription) = partial.get("transcription") {
            if let Some(endpoint) = transcription.get("endpoint").and_then(|v| v.as_str()) {
                self.transcription.endpoint = endpoint.to_string();
            }
            if let Some(model) = transcription.get("model").and_then(|v| v.as_str()) {
                self.transcription.model = model.to_string();
            }
            if let Some(timeout) = transcription
                .get("request_timeout_seconds")
                .and_then(|v| v.as_u64())
            {
                self.transcription.request_timeout_seconds = timeout;
            }
        }

        if let Some(performance) = partial.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
            if let Some(frames) = performance.get("max_pending_frames").and_then(|v| v.as_u64()) {
                self.performance.max_pending_frames = frames as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
