//! # Transcription Relay
//!
//! Forwards one cleaned segment to the external transcription capability and
//! turns the outcome into the session's outbound message. Exactly one attempt
//! is made per segment, since an automatic retry could emit a duplicate
//! transcript for the same audio. A failure never ends the session or blocks
//! the segments behind it.

use crate::audio::segmenter::SpeechSegment;
use crate::error::PipelineError;
use crate::transcription::transcriber::{encode_wav, Transcriber};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Text frame sent to the client, one per completed segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// The segment was transcribed
    Success { transcription: String },

    /// The segment could not be transcribed; the session continues
    Error { message: String },
}

/// Per-session forwarder to the external transcription capability.
pub struct TranscriptionRelay {
    transcriber: Arc<dyn Transcriber>,
    timeout: Duration,
}

impl TranscriptionRelay {
    pub fn new(transcriber: Arc<dyn Transcriber>, timeout: Duration) -> Self {
        Self {
            transcriber,
            timeout,
        }
    }

    /// Forward one segment under the bounded timeout.
    ///
    /// Always produces an outbound message; errors are reported to the
    /// client, never propagated.
    pub async fn relay(&self, segment: &SpeechSegment) -> OutboundMessage {
        let wav_bytes = match encode_wav(&segment.samples, segment.sample_rate) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(segment_id = %segment.id, error = %err, "failed to encode segment");
                return OutboundMessage::Error {
                    message: format!("failed to encode segment audio: {}", err),
                };
            }
        };

        debug!(
            segment_id = %segment.id,
            duration_s = segment.duration_seconds(),
            bytes = wav_bytes.len(),
            "relaying segment to transcription service"
        );

        let failure = match tokio::time::timeout(self.timeout, self.transcriber.transcribe(wav_bytes))
            .await
        {
            Ok(Ok(text)) => {
                return OutboundMessage::Success {
                    transcription: text,
                }
            }
            Ok(Err(err)) => PipelineError::Transcription(err.to_string()),
            Err(_) => PipelineError::Transcription(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            )),
        };

        warn!(segment_id = %segment.id, error = %failure, "segment not transcribed");
        OutboundMessage::Error {
            message: failure.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Scripted transcriber standing in for the external service.
    pub struct ScriptedTranscriber {
        text: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedTranscriber {
        fn succeeding(text: &str) -> Self {
            Self {
                text: Some(text.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                text: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(text: &str, delay: Duration) -> Self {
            Self {
                text: Some(text.to_string()),
                delay,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        async fn transcribe(&self, _wav_bytes: Vec<u8>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.text {
                Some(text) => Ok(text.clone()),
                None => Err(anyhow!("remote transcription error")),
            }
        }
    }

    fn segment() -> SpeechSegment {
        SpeechSegment {
            id: Uuid::new_v4(),
            start_sample: 0,
            samples: vec![0.1; 8000],
            sample_rate: 16000,
        }
    }

    #[actix_web::test]
    async fn test_relay_emits_success_message() {
        let transcriber = Arc::new(ScriptedTranscriber::succeeding("hello world"));
        let relay = TranscriptionRelay::new(transcriber.clone(), Duration::from_secs(5));

        let message = relay.relay(&segment()).await;
        assert_eq!(
            message,
            OutboundMessage::Success {
                transcription: "hello world".to_string()
            }
        );
        assert_eq!(transcriber.call_count(), 1);
    }

    #[actix_web::test]
    async fn test_relay_emits_error_message_on_failure() {
        let transcriber = Arc::new(ScriptedTranscriber::failing());
        let relay = TranscriptionRelay::new(transcriber.clone(), Duration::from_secs(5));

        match relay.relay(&segment()).await {
            OutboundMessage::Error { message } => {
                assert!(message.contains("remote transcription error"));
            }
            other => panic!("expected error message, got {:?}", other),
        }
        // Exactly one attempt, no automatic retry
        assert_eq!(transcriber.call_count(), 1);
    }

    #[actix_web::test]
    async fn test_relay_times_out_slow_transcription() {
        let transcriber = Arc::new(ScriptedTranscriber::slow(
            "too late",
            Duration::from_millis(250),
        ));
        let relay = TranscriptionRelay::new(transcriber.clone(), Duration::from_millis(20));

        match relay.relay(&segment()).await {
            OutboundMessage::Error { message } => {
                assert!(message.contains("timed out"));
            }
            other => panic!("expected timeout message, got {:?}", other),
        }
        assert_eq!(transcriber.call_count(), 1);
    }

    #[test]
    fn test_outbound_message_wire_format() {
        let success = OutboundMessage::Success {
            transcription: "hi".to_string(),
        };
        let json = serde_json::to_string(&success).unwrap();
        assert_eq!(json, r#"{"status":"success","transcription":"hi"}"#);

        let error = OutboundMessage::Error {
            message: "transcription timed out after 30s".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(
            json,
            r#"{"status":"error","message":"transcription timed out after 30s"}"#
        );
    }
}
