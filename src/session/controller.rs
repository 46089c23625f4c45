//! # Session Controller
//!
//! Owns one connection's pipeline end to end: ingestion buffer, segmenter,
//! noise reduction and transcription relay, plus the session's accounting.
//! The controller runs as a single task consuming commands from the
//! transport, which gives the ordering guarantees for free: frames are
//! processed strictly in arrival order, and the segmentation → noise
//! reduction → relay chain never runs twice concurrently for one session.
//!
//! The command channel from the transport is bounded; that bound is the
//! pipeline backlog. When it fills, the transport suspends reading instead
//! of dropping audio: both the accounting invariant and transcript
//! completeness require every ingested range to be processed exactly once.
//!
//! ## Lifecycle:
//! `Idle` → `Streaming` on the first frame → `Draining` on close or
//! transport loss (flushes everything still buffered through the full
//! pipeline) → `Closed` (metrics frozen, session removed from the registry).

use crate::audio::buffer::{decode_pcm_frame, IngestionBuffer};
use crate::audio::denoise::{BasicNoiseReducer, NoiseReductionStage};
use crate::audio::segmenter::{EnergyVoiceDetector, SpeechSegment, SpeechSegmenter};
use crate::config::AppConfig;
use crate::session::registry::{SessionHandle, SessionRegistry, SessionState};
use crate::transcription::relay::{OutboundMessage, TranscriptionRelay};
use crate::transcription::transcriber::Transcriber;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Commands delivered from the transport to the controller task, in order.
#[derive(Debug)]
pub enum ControllerCommand {
    /// A binary audio frame as received from the client
    Frame(Vec<u8>),

    /// Explicit close request; draining starts once queued frames are done
    Close,
}

/// Per-session pipeline driver. Exclusively owns the session's buffer and
/// stages; shared state is visible to the rest of the process only through
/// the [`SessionHandle`] in the registry.
pub struct SessionController {
    handle: Arc<SessionHandle>,
    registry: Arc<SessionRegistry>,
    buffer: IngestionBuffer,
    segmenter: SpeechSegmenter,
    denoise: NoiseReductionStage,
    relay: TranscriptionRelay,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    sample_rate: u32,
    last_segment_start: Option<u64>,
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

impl SessionController {
    /// Build a controller with the default capability implementations
    /// (energy detector, basic noise reducer) configured from `config`.
    pub fn new(
        handle: Arc<SessionHandle>,
        registry: Arc<SessionRegistry>,
        config: &AppConfig,
        transcriber: Arc<dyn Transcriber>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Self {
        let rate = config.audio.sample_rate;

        let segmenter = SpeechSegmenter::new(
            Box::new(EnergyVoiceDetector::new(
                config.segmenter.rms_threshold,
                ms_to_samples(config.segmenter.frame_ms, rate),
            )),
            ms_to_samples(config.segmenter.min_speech_ms, rate),
            ms_to_samples(config.segmenter.min_silence_ms, rate),
        );

        let denoise = NoiseReductionStage::new(Box::new(BasicNoiseReducer::new(
            config.denoise.smoothing_window,
        )));

        let relay = TranscriptionRelay::new(
            transcriber,
            Duration::from_secs(config.transcription.request_timeout_seconds),
        );

        Self::with_stages(handle, registry, config, segmenter, denoise, relay, outbound)
    }

    /// Build a controller from explicit stages; used to swap capability
    /// implementations.
    pub fn with_stages(
        handle: Arc<SessionHandle>,
        registry: Arc<SessionRegistry>,
        config: &AppConfig,
        segmenter: SpeechSegmenter,
        denoise: NoiseReductionStage,
        relay: TranscriptionRelay,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Self {
        Self {
            handle,
            registry,
            buffer: IngestionBuffer::new(
                config.audio.sample_rate,
                config.audio.buffer_min_seconds,
                config.audio.buffer_max_seconds,
            ),
            segmenter,
            denoise,
            relay,
            outbound,
            sample_rate: config.audio.sample_rate,
            last_segment_start: None,
        }
    }

    /// Consume commands until the transport closes, then drain.
    ///
    /// Both an explicit close and an abrupt transport loss (sender dropped)
    /// end here; neither skips draining.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ControllerCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                ControllerCommand::Frame(data) => self.ingest(&data).await,
                ControllerCommand::Close => break,
            }
        }

        self.drain().await;
    }

    /// Accept one raw frame: decode, account, buffer, and advance the
    /// pipeline over any windows that became ready.
    async fn ingest(&mut self, data: &[u8]) {
        if !self.handle.accepts_audio() {
            warn!(
                client_id = %self.handle.client_id,
                state = self.handle.state().as_str(),
                "discarding frame received outside Idle/Streaming"
            );
            return;
        }

        let samples = match decode_pcm_frame(data) {
            Ok(samples) => samples,
            Err(err) => {
                warn!(client_id = %self.handle.client_id, error = %err, "skipping malformed frame");
                return;
            }
        };

        if self.handle.state() == SessionState::Idle {
            self.handle.set_state(SessionState::Streaming);
            info!(client_id = %self.handle.client_id, "session streaming");
        }

        // Total accounting advances the moment audio arrives; it never waits
        // for downstream classification
        self.handle
            .metrics
            .record_ingested(samples.len() as f64 / self.sample_rate as f64);

        self.buffer.append(&samples);
        self.pump(false).await;
    }

    /// Run the segmentation → noise reduction → relay chain over every
    /// window the buffer is willing to release.
    async fn pump(&mut self, finalize: bool) {
        loop {
            let releasable = self.buffer.window_ready() || (finalize && !self.buffer.is_empty());
            if !releasable {
                break;
            }

            // An oversized carried tail is resolved without further carry
            let resolve_all = finalize || self.buffer.force_resolve_due();
            let window = self.buffer.window().to_vec();
            let base_offset = self.buffer.base_offset();

            match self.segmenter.segment(&window, self.sample_rate, resolve_all) {
                Ok(segmentation) => {
                    for span in &segmentation.spans {
                        let segment = SpeechSegment {
                            id: Uuid::new_v4(),
                            start_sample: base_offset + span.start as u64,
                            samples: window[span.start..span.end].to_vec(),
                            sample_rate: self.sample_rate,
                        };
                        self.process_segment(segment).await;
                    }

                    self.buffer.consume(segmentation.resolved_len);
                    if segmentation.resolved_len == 0 {
                        // The unresolved tail spans the whole window; nothing
                        // more can be decided until more audio arrives
                        break;
                    }
                }
                Err(err) => {
                    // Non-fatal: the window already counted toward total, it
                    // just yields no segments
                    warn!(
                        client_id = %self.handle.client_id,
                        error = %err,
                        window_s = window.len() as f64 / self.sample_rate as f64,
                        "classifier failed, window yields no segments"
                    );
                    self.buffer.consume(window.len());
                }
            }
        }
    }

    /// Clean one accepted segment, account it as processed, and relay it.
    async fn process_segment(&mut self, mut segment: SpeechSegment) {
        debug_assert!(
            self.last_segment_start
                .map_or(true, |last| segment.start_sample > last),
            "segment start offsets must be strictly increasing"
        );
        self.last_segment_start = Some(segment.start_sample);

        segment.samples = self.denoise.apply(&segment.samples, self.sample_rate);

        // Optimization measures what was sent, not whether transcription
        // succeeds, so the segment counts as processed before the relay call
        self.handle
            .metrics
            .record_processed(segment.duration_seconds());

        let message = self.relay.relay(&segment).await;
        if self.outbound.send(message).is_err() {
            debug!(
                client_id = %self.handle.client_id,
                "outbound channel closed, transcript not deliverable"
            );
        }
    }

    /// Flush everything still buffered through the full pipeline, freeze the
    /// metrics, and remove the session from the registry.
    async fn drain(&mut self) {
        if self.handle.state() == SessionState::Closed {
            return;
        }

        self.handle.set_state(SessionState::Draining);
        info!(
            client_id = %self.handle.client_id,
            buffered_s = self.buffer.duration_seconds(),
            "draining session"
        );

        self.pump(true).await;

        self.handle.metrics.freeze();
        self.handle.set_state(SessionState::Closed);
        self.registry.remove(&self.handle.client_id);

        let snapshot = self.handle.metrics.snapshot();
        info!(
            client_id = %self.handle.client_id,
            total_s = snapshot.total_audio_seconds,
            processed_s = snapshot.processed_audio_seconds,
            saved_s = snapshot.seconds_saved,
            "session closed"
        );
    }
}
