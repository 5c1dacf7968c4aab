//! Window Statistics Computed From Scratch

use ring_buffer::SampleBuffer;

/// Per-dimension mean and population variance over a window
///
/// Every one of the `window` slots counts; slots not yet filled are zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStatistics {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

impl WindowStatistics {
    /// Two-pass computation over the retained samples of `buffer`
    pub fn compute(buffer: &SampleBuffer, window: usize, dimension: usize) -> Self {
        if window == 0 || dimension == 0 {
            return Self::default();
        }
        let n = window as f64;
        let absent = window.saturating_sub(buffer.len()) as f64;

        let mut mean = vec![0.0; dimension];
        for sample in buffer.iter_recent() {
            for (m, v) in mean.iter_mut().zip(sample) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut variance: Vec<f64> = mean.iter().map(|m| absent * m * m).collect();
        for sample in buffer.iter_recent() {
            for ((var, m), v) in variance.iter_mut().zip(&mean).zip(sample) {
                let d = v - m;
                *var += d * d;
            }
        }
        for var in &mut variance {
            *var /= n;
        }

        Self { mean, variance }
    }
}
