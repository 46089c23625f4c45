//! # Speech Segmentation
//!
//! Classifies classification windows into speech and non-speech spans. The
//! raw classifier is a pluggable capability behind [`VoiceDetector`]; the
//! [`SpeechSegmenter`] layers utterance policy on top of it:
//!
//! - spans separated by a silence gap shorter than the minimum silence
//!   threshold are merged, so one utterance does not fragment into many
//!   segments;
//! - spans shorter than the minimum speech threshold are discarded as noise
//!   spikes;
//! - a span not yet followed by a full silence gap at the window boundary is
//!   reported as an unresolved tail and carried into the next window, so a
//!   sentence is not truncated mid-word.
//!
//! A classifier failure is non-fatal: the caller counts the window's audio,
//! produces no segments, and continues with the next window.

use crate::error::PipelineError;
use uuid::Uuid;

/// A half-open sample range `[start, end)` relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpan {
    pub start: usize,
    pub end: usize,
}

impl SampleSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// A contiguous speech span on the session's absolute sample timeline,
/// carrying the samples to clean and transcribe.
///
/// Segments within one session are disjoint and strictly increasing in
/// `start_sample`.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Unique id for tracing one segment through the pipeline
    pub id: Uuid,

    /// Absolute offset of the first sample on the session timeline
    pub start_sample: u64,

    /// Normalized mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,

    pub sample_rate: u32,
}

impl SpeechSegment {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Raw speech/non-speech classifier capability.
///
/// Input is one contiguous window of normalized mono samples; output is zero
/// or more disjoint, ordered speech spans inside the window. Implementations
/// must be swappable without touching the session controller.
pub trait VoiceDetector: Send + Sync {
    fn detect(&self, window: &[f32], sample_rate: u32) -> Result<Vec<SampleSpan>, PipelineError>;
}

/// Frame-energy voice detector.
///
/// Splits the window into fixed-length frames and classifies a frame as
/// speech when its RMS amplitude exceeds the configured threshold,
/// grouping consecutive speech frames into spans. Windows shorter than
/// 250 ms carry too little context and classify as no-speech.
pub struct EnergyVoiceDetector {
    rms_threshold: f32,
    frame_samples: usize,
}

impl EnergyVoiceDetector {
    pub fn new(rms_threshold: f32, frame_samples: usize) -> Self {
        Self {
            rms_threshold,
            frame_samples: frame_samples.max(1),
        }
    }

    fn is_speech_frame(&self, frame: &[f32]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }
}

impl VoiceDetector for EnergyVoiceDetector {
    fn detect(&self, window: &[f32], sample_rate: u32) -> Result<Vec<SampleSpan>, PipelineError> {
        if window.len() < (sample_rate / 4) as usize {
            return Ok(Vec::new());
        }

        let mut spans = Vec::new();
        let mut current: Option<SampleSpan> = None;

        for (index, frame) in window.chunks(self.frame_samples).enumerate() {
            let start = index * self.frame_samples;
            let end = (start + frame.len()).min(window.len());

            if self.is_speech_frame(frame) {
                match current.as_mut() {
                    Some(span) => span.end = end,
                    None => current = Some(SampleSpan { start, end }),
                }
            } else if let Some(span) = current.take() {
                spans.push(span);
            }
        }

        if let Some(span) = current {
            spans.push(span);
        }

        Ok(spans)
    }
}

/// Result of segmenting one window.
#[derive(Debug)]
pub struct Segmentation {
    /// Closed speech spans, relative to the window, ready for the pipeline
    pub spans: Vec<SampleSpan>,

    /// Length of the window prefix that is definitively classified; the
    /// suffix from here on is the unresolved tail the buffer retains
    pub resolved_len: usize,
}

/// Utterance policy layered over a raw [`VoiceDetector`].
pub struct SpeechSegmenter {
    detector: Box<dyn VoiceDetector>,
    min_speech_samples: usize,
    min_silence_samples: usize,
}

impl SpeechSegmenter {
    pub fn new(
        detector: Box<dyn VoiceDetector>,
        min_speech_samples: usize,
        min_silence_samples: usize,
    ) -> Self {
        Self {
            detector,
            min_speech_samples,
            min_silence_samples,
        }
    }

    /// Segment one window into closed speech spans plus an unresolved tail.
    ///
    /// With `finalize` set (drain, or a force-resolved oversized window) the
    /// whole window is resolved and no tail is carried.
    pub fn segment(
        &self,
        window: &[f32],
        sample_rate: u32,
        finalize: bool,
    ) -> Result<Segmentation, PipelineError> {
        let raw = self.detector.detect(window, sample_rate)?;
        let mut spans = self.merge_close_spans(raw);

        let mut resolved_len = window.len();
        if !finalize {
            // The last span is still open when the window ends before a full
            // silence gap has been observed after it.
            if let Some(last) = spans.last().copied() {
                if window.len().saturating_sub(last.end) < self.min_silence_samples {
                    resolved_len = last.start;
                    spans.pop();
                }
            }
        }

        spans.retain(|span| span.len() >= self.min_speech_samples);

        Ok(Segmentation {
            spans,
            resolved_len,
        })
    }

    /// Merge spans separated by a silence gap shorter than the minimum
    /// silence threshold.
    fn merge_close_spans(&self, raw: Vec<SampleSpan>) -> Vec<SampleSpan> {
        let mut merged: Vec<SampleSpan> = Vec::with_capacity(raw.len());

        for span in raw {
            match merged.last_mut() {
                Some(prev) if span.start.saturating_sub(prev.end) < self.min_silence_samples => {
                    prev.end = span.end;
                }
                _ => merged.push(span),
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn segmenter() -> SpeechSegmenter {
        // 30ms frames, 250ms minimum speech, 1000ms minimum silence
        SpeechSegmenter::new(
            Box::new(EnergyVoiceDetector::new(0.01, 480)),
            4000,
            16000,
        )
    }

    /// Build a signal from (duration_seconds, amplitude) parts.
    fn signal(parts: &[(f64, f32)]) -> Vec<f32> {
        let mut samples = Vec::new();
        for &(seconds, amplitude) in parts {
            samples.extend(vec![amplitude; (seconds * RATE as f64) as usize]);
        }
        samples
    }

    struct FailingDetector;

    impl VoiceDetector for FailingDetector {
        fn detect(&self, _: &[f32], _: u32) -> Result<Vec<SampleSpan>, PipelineError> {
            Err(PipelineError::Segmentation("model unavailable".to_string()))
        }
    }

    #[test]
    fn test_detector_finds_speech_span() {
        let detector = EnergyVoiceDetector::new(0.01, 480);
        // Boundaries aligned to the 480-sample frame grid
        let window = signal(&[(1.2, 0.0), (0.9, 0.5), (1.2, 0.0)]);
        let spans = detector.detect(&window, RATE).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 19200);
        assert_eq!(spans[0].end, 33600);
    }

    #[test]
    fn test_detector_skips_window_below_minimum_context() {
        let detector = EnergyVoiceDetector::new(0.01, 480);
        let window = signal(&[(0.2, 0.5)]);
        assert!(detector.detect(&window, RATE).unwrap().is_empty());
    }

    #[test]
    fn test_short_silence_gap_merges_into_one_utterance() {
        let window = signal(&[(0.5, 0.5), (0.5, 0.0), (0.5, 0.5), (1.5, 0.0)]);
        let seg = segmenter().segment(&window, RATE, false).unwrap();
        assert_eq!(seg.spans.len(), 1);
        assert_eq!(seg.spans[0].start, 0);
        assert_eq!(seg.spans[0].end, 24000);
        assert_eq!(seg.resolved_len, window.len());
    }

    #[test]
    fn test_long_silence_gap_keeps_spans_distinct() {
        let window = signal(&[(0.5, 0.5), (1.2, 0.0), (0.5, 0.5), (1.5, 0.0)]);
        let seg = segmenter().segment(&window, RATE, false).unwrap();
        assert_eq!(seg.spans.len(), 2);
        assert!(seg.spans[0].end <= seg.spans[1].start);
    }

    #[test]
    fn test_noise_spike_is_discarded() {
        let window = signal(&[(0.5, 0.0), (0.1, 0.5), (1.4, 0.0)]);
        let seg = segmenter().segment(&window, RATE, false).unwrap();
        assert!(seg.spans.is_empty());
        assert_eq!(seg.resolved_len, window.len());
    }

    #[test]
    fn test_open_span_becomes_unresolved_tail() {
        // Speech runs into the window boundary: nothing is emitted and the
        // span start marks the resolved prefix.
        let window = signal(&[(1.5, 0.0), (1.0, 0.5)]);
        let seg = segmenter().segment(&window, RATE, false).unwrap();
        assert!(seg.spans.is_empty());
        assert_eq!(seg.resolved_len, 24000);
    }

    #[test]
    fn test_finalize_resolves_open_span() {
        let window = signal(&[(1.5, 0.0), (1.0, 0.5)]);
        let seg = segmenter().segment(&window, RATE, true).unwrap();
        assert_eq!(seg.spans.len(), 1);
        assert_eq!(seg.spans[0].start, 24000);
        assert_eq!(seg.resolved_len, window.len());
    }

    #[test]
    fn test_all_silence_resolves_fully() {
        let window = signal(&[(3.0, 0.0)]);
        let seg = segmenter().segment(&window, RATE, false).unwrap();
        assert!(seg.spans.is_empty());
        assert_eq!(seg.resolved_len, window.len());
    }

    #[test]
    fn test_detector_failure_propagates() {
        let segmenter = SpeechSegmenter::new(Box::new(FailingDetector), 4000, 16000);
        let window = signal(&[(2.0, 0.5)]);
        assert!(matches!(
            segmenter.segment(&window, RATE, false),
            Err(PipelineError::Segmentation(_))
        ));
    }
}
