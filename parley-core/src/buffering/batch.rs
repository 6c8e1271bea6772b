//! Typed frame batch passed from the capture worker to the transcriber.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Nominally one second of audio at the engine's target rate. Allocated on
/// the capture worker thread, never on the RT audio callback.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
}

impl FrameBatch {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this batch in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Root-mean-square level of the batch in [0.0, 1.0].
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }

    /// Returns true if the batch contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn duration_of_one_second_batch() {
        let batch = FrameBatch::new(vec![0.0; 16_000], 16_000);
        assert_relative_eq!(batch.duration_secs(), 1.0);
    }

    #[test]
    fn rms_of_square_wave() {
        // A square wave at ±0.5 has RMS = 0.5
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let batch = FrameBatch::new(samples, 16_000);
        assert_relative_eq!(batch.rms(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn empty_batch_has_zero_rms() {
        let batch = FrameBatch::new(vec![], 16_000);
        assert!(batch.is_empty());
        assert_eq!(batch.rms(), 0.0);
    }
}
