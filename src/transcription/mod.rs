//! # Transcription Module
//!
//! The boundary to the external speech-to-text service. Everything upstream
//! of this module works to shrink what crosses it:
//!
//! - **Transcriber**: the external capability (hosted Whisper-compatible
//!   HTTP endpoint), fallible and latency-bearing
//! - **Transcription Relay**: one bounded-timeout forward attempt per
//!   segment, mapped to the session's outbound protocol messages

pub mod relay;
pub mod transcriber;

pub use relay::{OutboundMessage, TranscriptionRelay};
pub use transcriber::{HttpTranscriber, Transcriber};
