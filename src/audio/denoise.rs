//! # Noise Reduction
//!
//! Cleans accepted speech segments before they leave the process. The
//! transform is a pluggable capability behind [`NoiseReducer`]; the
//! [`NoiseReductionStage`] enforces its contract (cleaned output must have
//! exactly the input's length) and falls back to the original samples when
//! the reducer fails or violates it. A lower-quality transcript beats a
//! dropped segment.

use crate::error::PipelineError;
use tracing::warn;

/// Pure segment transform capability: samples in, cleaned samples of
/// identical duration out.
pub trait NoiseReducer: Send + Sync {
    fn reduce(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, PipelineError>;
}

/// Baseline reducer: DC-offset removal followed by a short moving-average
/// filter that attenuates high-frequency noise while leaving the speech band
/// mostly untouched.
pub struct BasicNoiseReducer {
    /// Moving-average window in samples (odd); 1 disables smoothing
    smoothing_window: usize,
}

impl BasicNoiseReducer {
    pub fn new(smoothing_window: usize) -> Self {
        Self {
            smoothing_window: smoothing_window.max(1),
        }
    }
}

impl NoiseReducer for BasicNoiseReducer {
    fn reduce(&self, samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>, PipelineError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        // Remove DC offset
        let offset = samples.iter().sum::<f32>() / samples.len() as f32;
        let centered: Vec<f32> = samples.iter().map(|s| s - offset).collect();

        if self.smoothing_window <= 1 || centered.len() < self.smoothing_window {
            return Ok(centered);
        }

        // Centered moving average; edges keep their original values so the
        // output length matches the input exactly
        let half = self.smoothing_window / 2;
        let mut cleaned = centered.clone();
        for i in half..centered.len() - half {
            let window = &centered[i - half..=i + half];
            cleaned[i] = window.iter().sum::<f32>() / window.len() as f32;
        }

        Ok(cleaned)
    }
}

/// Applies a [`NoiseReducer`] with its failure contract.
pub struct NoiseReductionStage {
    reducer: Box<dyn NoiseReducer>,
}

impl NoiseReductionStage {
    pub fn new(reducer: Box<dyn NoiseReducer>) -> Self {
        Self { reducer }
    }

    /// Clean a segment's samples.
    ///
    /// On reducer failure, or if the reducer returns a different number of
    /// samples than it was given, the original samples are forwarded
    /// unchanged.
    pub fn apply(&self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        match self.reducer.reduce(samples, sample_rate) {
            Ok(cleaned) if cleaned.len() == samples.len() => cleaned,
            Ok(cleaned) => {
                warn!(
                    expected = samples.len(),
                    got = cleaned.len(),
                    "noise reducer changed segment length, forwarding original"
                );
                samples.to_vec()
            }
            Err(err) => {
                warn!(error = %err, "noise reduction failed, forwarding original");
                samples.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReducer;

    impl NoiseReducer for FailingReducer {
        fn reduce(&self, _: &[f32], _: u32) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::NoiseReduction("model unavailable".to_string()))
        }
    }

    struct TruncatingReducer;

    impl NoiseReducer for TruncatingReducer {
        fn reduce(&self, samples: &[f32], _: u32) -> Result<Vec<f32>, PipelineError> {
            Ok(samples[..samples.len() / 2].to_vec())
        }
    }

    #[test]
    fn test_reducer_preserves_length() {
        let reducer = BasicNoiseReducer::new(3);
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let cleaned = reducer.reduce(&samples, 16000).unwrap();
        assert_eq!(cleaned.len(), samples.len());
    }

    #[test]
    fn test_reducer_removes_dc_offset() {
        let reducer = BasicNoiseReducer::new(1);
        let samples = vec![0.3; 800];
        let cleaned = reducer.reduce(&samples, 16000).unwrap();
        let mean: f32 = cleaned.iter().sum::<f32>() / cleaned.len() as f32;
        assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn test_stage_forwards_original_on_failure() {
        let stage = NoiseReductionStage::new(Box::new(FailingReducer));
        let samples = vec![0.5, -0.5, 0.25];
        assert_eq!(stage.apply(&samples, 16000), samples);
    }

    #[test]
    fn test_stage_forwards_original_on_length_violation() {
        let stage = NoiseReductionStage::new(Box::new(TruncatingReducer));
        let samples = vec![0.5; 100];
        assert_eq!(stage.apply(&samples, 16000), samples);
    }

    #[test]
    fn test_stage_returns_cleaned_output() {
        let stage = NoiseReductionStage::new(Box::new(BasicNoiseReducer::new(3)));
        let samples = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let cleaned = stage.apply(&samples, 16000);
        assert_eq!(cleaned.len(), samples.len());
        // Smoothing pulls alternating samples toward their neighborhood mean
        assert!(cleaned[2] > samples[2] - 0.5 && cleaned[2] < samples[3]);
    }
}
