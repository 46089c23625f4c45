//! # Transcription Capability
//!
//! The external speech-to-text service consumed by the relay: the rate- and
//! cost-bearing dependency this whole pipeline exists to conserve. The
//! capability is a trait so the controller and relay never know whether they
//! are talking to the real HTTP endpoint or a scripted test double.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::env;
use std::io::Cursor;
use std::time::Duration;

/// Environment variable holding the API key for the hosted endpoint.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// External transcription capability: encoded audio in, text out.
///
/// Calls are fallible and may be slow; the relay wraps every call in a
/// timeout and makes exactly one attempt per segment.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String>;
}

/// Encode normalized `f32` samples as an in-memory 16-bit PCM WAV file, the
/// format the hosted transcription endpoint accepts.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect();

    let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, sample_rate, 16);
    let mut cursor = Cursor::new(Vec::new());
    wav::write(header, &wav::BitDepth::Sixteen(pcm), &mut cursor)
        .context("failed to encode segment as WAV")?;

    Ok(cursor.into_inner())
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint.
///
/// A missing API key is not a startup failure: every call simply errors and
/// the relay reports it per segment, keeping the failure session-local.
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(endpoint: String, model: String, request_timeout: Duration) -> Result<Self> {
        // The relay enforces its own per-segment timeout; this client-level
        // timeout is a backstop for connection establishment
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build transcription HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model,
            api_key: env::var(API_KEY_ENV).ok(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("no API key configured (set {})", API_KEY_ENV))?;

        let file = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("segment.wav")
            .mime_str("audio/wav")
            .context("failed to build multipart audio part")?;

        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "text");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "transcription endpoint returned {}: {}",
                status,
                body.trim()
            ));
        }

        let text = response
            .text()
            .await
            .context("failed to read transcription response")?;

        Ok(text.trim().to_string())
    }
}
