//! # Audio Pipeline Stages
//!
//! The per-session signal path between the transport and the transcription
//! relay:
//!
//! - **Ingestion Buffer**: accumulates raw samples and releases
//!   classification windows, retaining unresolved tails across windows
//! - **Speech Segmenter**: pluggable speech/non-speech classifier plus
//!   utterance policy (gap merging, spike suppression, tail carryover)
//! - **Noise Reduction**: pluggable segment cleaner with a
//!   forward-uncleaned-on-failure contract
//!
//! ## Audio Format:
//! - **Sample Rate**: fixed per deployment (default 16 kHz)
//! - **Encoding**: 16-bit little-endian signed PCM, mono, arbitrary chunk size
//!
//! Internally everything runs on normalized `f32` samples in `[-1.0, 1.0]`.

pub mod buffer;
pub mod denoise;
pub mod segmenter;
