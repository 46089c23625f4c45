//! # Ingestion Buffer
//!
//! Per-session accumulator of raw samples sitting between the transport and
//! the speech segmenter. Frames of arbitrary size are appended in arrival
//! order; once a configurable minimum duration has accumulated, the full
//! buffered range is released as a classification window.
//!
//! After segmentation the caller reports how much of the window was resolved;
//! the buffer drops the resolved prefix and retains the unresolved tail for
//! the next window, so an utterance is never truncated at a window boundary.
//!
//! ## Guarantees:
//! - No sample is lost or reordered.
//! - Every submitted sample is resolved (classified definitively) exactly once:
//!   the resolved prefix only ever advances, and retained tail samples are
//!   re-presented until they resolve.
//! - `base_offset` gives the absolute position of the buffer head on the
//!   session timeline, so segment start offsets are strictly increasing.

use byteorder::{ByteOrder, LittleEndian};

/// Decode a binary frame of 16-bit little-endian mono PCM into normalized
/// `f32` samples in `[-1.0, 1.0]`.
///
/// Returns an error for an odd-length frame; a malformed frame is skipped by
/// the caller without ending the session.
pub fn decode_pcm_frame(data: &[u8]) -> Result<Vec<f32>, String> {
    if data.is_empty() {
        return Err("empty audio frame".to_string());
    }
    if data.len() % 2 != 0 {
        return Err("audio frame length must be even for 16-bit samples".to_string());
    }

    let mut samples = Vec::with_capacity(data.len() / 2);
    for chunk in data.chunks_exact(2) {
        let sample = LittleEndian::read_i16(chunk);
        samples.push(sample as f32 / 32768.0);
    }

    Ok(samples)
}

/// Sliding accumulator over one session's sample timeline.
///
/// Owned exclusively by the session's controller task; no internal locking.
pub struct IngestionBuffer {
    /// Buffered samples, head first
    samples: Vec<f32>,

    /// Absolute offset of `samples[0]` on the session timeline
    base_offset: u64,

    sample_rate: u32,

    /// Window is released once this many samples are buffered
    min_window_samples: usize,

    /// A buffer at or beyond this size is force-resolved (no tail carry)
    max_window_samples: usize,
}

impl IngestionBuffer {
    /// Create a buffer for the given sample rate and window bounds in seconds.
    pub fn new(sample_rate: u32, min_window_seconds: f64, max_window_seconds: f64) -> Self {
        let min_window_samples = (min_window_seconds * sample_rate as f64) as usize;
        let max_window_samples = (max_window_seconds * sample_rate as f64) as usize;

        Self {
            samples: Vec::with_capacity(max_window_samples),
            base_offset: 0,
            sample_rate,
            min_window_samples,
            max_window_samples,
        }
    }

    /// Append decoded samples in arrival order.
    pub fn append(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// True once enough audio has accumulated for a reliable classification
    /// window.
    pub fn window_ready(&self) -> bool {
        self.samples.len() >= self.min_window_samples
    }

    /// True when the buffered range has hit the hard cap and must be resolved
    /// without carrying a tail, bounding memory when speech never pauses.
    pub fn force_resolve_due(&self) -> bool {
        self.samples.len() >= self.max_window_samples
    }

    /// The full buffered range, handed to the segmenter as one window.
    pub fn window(&self) -> &[f32] {
        &self.samples
    }

    /// Absolute offset of the buffer head on the session timeline.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Drop the resolved prefix and advance the timeline offset, retaining
    /// only the unresolved tail.
    ///
    /// `resolved_len` is clamped to the buffered length; consuming 0 samples
    /// leaves the buffer untouched (the segmenter wants more context).
    pub fn consume(&mut self, resolved_len: usize) {
        let resolved = resolved_len.min(self.samples.len());
        if resolved == 0 {
            return;
        }

        self.samples.drain(..resolved);
        self.base_offset += resolved as u64;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of buffered audio in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_decode_pcm_frame() {
        let data = pcm_bytes(&[0, 16384, -16384, 32767]);
        let samples = decode_pcm_frame(&data).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-4);
        assert!((samples[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(decode_pcm_frame(&[]).is_err());
        assert!(decode_pcm_frame(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_window_released_at_minimum_duration() {
        let mut buffer = IngestionBuffer::new(16000, 1.5, 5.0);
        buffer.append(&vec![0.0; 16000]); // 1.0s
        assert!(!buffer.window_ready());
        buffer.append(&vec![0.0; 8000]); // 1.5s total
        assert!(buffer.window_ready());
        assert_eq!(buffer.window().len(), 24000);
    }

    #[test]
    fn test_consume_retains_tail_and_advances_offset() {
        let mut buffer = IngestionBuffer::new(16000, 1.5, 5.0);
        let mut samples = vec![0.0; 16000];
        samples.extend(vec![0.5; 8000]);
        buffer.append(&samples);

        buffer.consume(16000);
        assert_eq!(buffer.base_offset(), 16000);
        assert_eq!(buffer.len(), 8000);
        // The retained tail is the original suffix, in order
        assert!(buffer.window().iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_consume_zero_is_a_no_op() {
        let mut buffer = IngestionBuffer::new(16000, 1.5, 5.0);
        buffer.append(&vec![0.1; 4000]);
        buffer.consume(0);
        assert_eq!(buffer.len(), 4000);
        assert_eq!(buffer.base_offset(), 0);
    }

    #[test]
    fn test_force_resolve_at_maximum_duration() {
        let mut buffer = IngestionBuffer::new(16000, 1.5, 5.0);
        buffer.append(&vec![0.0; 79999]);
        assert!(!buffer.force_resolve_due());
        buffer.append(&[0.0]);
        assert!(buffer.force_resolve_due());
    }

    #[test]
    fn test_samples_preserved_in_arrival_order() {
        let mut buffer = IngestionBuffer::new(16000, 1.5, 5.0);
        buffer.append(&[0.1, 0.2]);
        buffer.append(&[0.3]);
        buffer.append(&[0.4, 0.5]);
        assert_eq!(buffer.window(), &[0.1, 0.2, 0.3, 0.4, 0.5]);
    }
}
