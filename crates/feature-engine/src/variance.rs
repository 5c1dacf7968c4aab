//! Windowed Variance Features

use crate::factory::parse_windowed;
use crate::feature::{emplace_binary, emplace_delay, resolved_input, single_input, sum_taps, window_divisor};
use crate::window::WindowState;
use crate::{Feature, FeatureError, FeatureId, FeatureKind, FeatureOutputs, FeatureSet, WindowStatistics};
use model_graph::{AccumulatorNode, BinaryOp, CoordinateList, Model};

/// Population variance over the last `window` samples, recomputed from the
/// buffer in two passes
#[derive(Debug, Clone)]
pub struct VarianceFeature {
    state: WindowState,
}

impl VarianceFeature {
    /// Create a feature over `window` samples of feature `input`
    pub fn new(id: impl Into<String>, input: FeatureId, window: usize) -> Result<Self, FeatureError> {
        Ok(Self {
            state: WindowState::new(id, input, window)?,
        })
    }

    /// Build from `[id, "variance", input, window]`
    pub fn create(params: &[&str], previous: &FeatureSet) -> Result<Self, FeatureError> {
        let (id, input, window) = parse_windowed(FeatureKind::Variance, params, previous)?;
        Self::new(id, input, window)
    }

    /// Number of samples in the window
    pub fn window_size(&self) -> usize {
        self.state.window
    }

    /// Index of the feature this one reads
    pub fn input_feature(&self) -> FeatureId {
        self.state.input
    }
}

impl Feature for VarianceFeature {
    fn id(&self) -> &str {
        &self.state.id
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Variance
    }

    fn inputs(&self) -> &[FeatureId] {
        std::slice::from_ref(&self.state.input)
    }

    fn output_dimension(&self) -> Option<usize> {
        self.state.output_dimension
    }

    fn compute_output(&mut self, inputs: &[&[f64]]) -> Result<Vec<f64>, FeatureError> {
        let sample = single_input(&self.state.id, inputs)?;
        self.state.validate(sample)?;
        self.state.push(sample)?;
        Ok(WindowStatistics::compute(&self.state.buffer, self.state.window, sample.len()).variance)
    }

    fn add_to_model(&self, model: &mut Model, outputs: &FeatureOutputs) -> Result<CoordinateList, FeatureError> {
        let input = resolved_input(&self.state.id, self.state.input, outputs)?;
        let divisor = window_divisor(model, self.state.window, input.len())?;

        let (buffer, delay) = emplace_delay(model, input, self.state.window)?;
        let (sum, taps) = sum_taps(model, &delay, &buffer)?;
        let mean = emplace_binary(model, &sum, &divisor, BinaryOp::Divide)?;

        let mut sum_sq: Option<CoordinateList> = None;
        for tap in &taps {
            let deviation = emplace_binary(model, tap, &mean, BinaryOp::Subtract)?;
            let squared = emplace_binary(model, &deviation, &deviation, BinaryOp::Multiply)?;
            sum_sq = Some(match sum_sq {
                Some(acc) => emplace_binary(model, &acc, &squared, BinaryOp::Add)?,
                None => squared,
            });
        }
        let sum_sq = sum_sq.ok_or_else(|| FeatureError::IllegalState("delay node without taps".to_string()))?;
        emplace_binary(model, &sum_sq, &divisor, BinaryOp::Divide)
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Population variance over the last `window` samples from running sums,
/// O(D) per sample regardless of the window size
///
/// Until `window` samples have been seen, the sample leaving the window is
/// taken as zero, so early values understate the variance of the samples
/// seen so far.
#[derive(Debug, Clone)]
pub struct IncrementalVarianceFeature {
    state: WindowState,
    running_sum: Vec<f64>,
    running_sum_sq: Vec<f64>,
}

impl IncrementalVarianceFeature {
    /// Create a feature over `window` samples of feature `input`
    pub fn new(id: impl Into<String>, input: FeatureId, window: usize) -> Result<Self, FeatureError> {
        Ok(Self {
            state: WindowState::new(id, input, window)?,
            running_sum: Vec::new(),
            running_sum_sq: Vec::new(),
        })
    }

    /// Build from `[id, "incremental_variance", input, window]`
    pub fn create(params: &[&str], previous: &FeatureSet) -> Result<Self, FeatureError> {
        let (id, input, window) = parse_windowed(FeatureKind::IncrementalVariance, params, previous)?;
        Self::new(id, input, window)
    }

    /// Number of samples in the window
    pub fn window_size(&self) -> usize {
        self.state.window
    }

    /// Index of the feature this one reads
    pub fn input_feature(&self) -> FeatureId {
        self.state.input
    }

    /// Per-dimension sum over the window
    pub fn running_sum(&self) -> &[f64] {
        &self.running_sum
    }

    /// Per-dimension sum of squares over the window
    pub fn running_sum_sq(&self) -> &[f64] {
        &self.running_sum_sq
    }
}

impl Feature for IncrementalVarianceFeature {
    fn id(&self) -> &str {
        &self.state.id
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::IncrementalVariance
    }

    fn inputs(&self) -> &[FeatureId] {
        std::slice::from_ref(&self.state.input)
    }

    fn output_dimension(&self) -> Option<usize> {
        self.state.output_dimension
    }

    fn compute_output(&mut self, inputs: &[&[f64]]) -> Result<Vec<f64>, FeatureError> {
        let sample = single_input(&self.state.id, inputs)?;
        self.state.validate(sample)?;

        let dimension = sample.len();
        let old = self.state.departing(dimension);
        self.state.push(sample)?;
        self.running_sum.resize(dimension, 0.0);
        self.running_sum_sq.resize(dimension, 0.0);

        let window = self.state.window as f64;
        let mut result = vec![0.0; dimension];
        for index in 0..dimension {
            let new_val = sample[index];
            let old_val = old[index];
            self.running_sum[index] += new_val - old_val;
            self.running_sum_sq[index] += new_val * new_val - old_val * old_val;

            let sum = self.running_sum[index];
            result[index] = (self.running_sum_sq[index] - sum * sum / window) / window;
        }
        Ok(result)
    }

    fn add_to_model(&self, model: &mut Model, outputs: &FeatureOutputs) -> Result<CoordinateList, FeatureError> {
        let input = resolved_input(&self.state.id, self.state.input, outputs)?;
        let window = self.state.window;

        // `window` broadcast to the input width
        let divisor = window_divisor(model, window, input.len())?;

        // Shift register one deeper than the window so the departing sample is still visible
        let (buffer, delay) = emplace_delay(model, input, window + 1)?;
        let oldest = delay.delayed_output(&buffer, window)?;

        let diff = emplace_binary(model, input, &oldest, BinaryOp::Subtract)?;
        let running_sum = model.emplace(AccumulatorNode::new(diff))?;

        let squared_sum = emplace_binary(model, &running_sum, &running_sum, BinaryOp::Multiply)?;
        let norm_squared_sum = emplace_binary(model, &squared_sum, &divisor, BinaryOp::Divide)?;

        let new_squared = emplace_binary(model, input, input, BinaryOp::Multiply)?;
        let old_squared = emplace_binary(model, &oldest, &oldest, BinaryOp::Multiply)?;
        let diff_squared = emplace_binary(model, &new_squared, &old_squared, BinaryOp::Subtract)?;
        let running_sum_sq = model.emplace(AccumulatorNode::new(diff_squared))?;

        // var = (sum(x^2) - sum(x)^2 / N) / N
        let variance_times_n = emplace_binary(model, &running_sum_sq, &norm_squared_sum, BinaryOp::Subtract)?;
        emplace_binary(model, &variance_times_n, &divisor, BinaryOp::Divide)
    }

    fn reset(&mut self) {
        self.state.reset();
        self.running_sum.clear();
        self.running_sum_sq.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn population_variance(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
    }

    #[test]
    fn test_golden_trace() {
        let mut variance = IncrementalVarianceFeature::new("v", 0, 2).unwrap();
        let trace: Vec<f64> = [1.0, 3.0, 5.0]
            .iter()
            .map(|v| variance.compute_output(&[&[*v]]).unwrap()[0])
            .collect();
        assert_eq!(trace, vec![0.25, 1.0, 1.0]);
        assert_eq!(variance.running_sum(), &[8.0]);
        assert_eq!(variance.running_sum_sq(), &[34.0]);
    }

    #[test]
    fn test_partial_window_zero_fill() {
        // window 3, two samples: the delayed sample at k = 2 does not exist yet
        let mut variance = IncrementalVarianceFeature::new("v", 0, 3).unwrap();
        variance.compute_output(&[&[3.0]]).unwrap();
        let out = variance.compute_output(&[&[6.0]]).unwrap();
        assert_eq!(variance.state.buffer.delayed(2), None);
        // slots [6, 3, 0]: mean 3, variance (9 + 0 + 9) / 3
        assert!((out[0] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_dimension_rejected_without_mutation() {
        let mut variance = IncrementalVarianceFeature::new("v", 0, 2).unwrap();
        variance.compute_output(&[&[1.0, 2.0]]).unwrap();
        let sum = variance.running_sum().to_vec();
        let sum_sq = variance.running_sum_sq().to_vec();

        let err = variance.compute_output(&[&[]]).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidInput(_)));
        assert_eq!(variance.running_sum(), sum.as_slice());
        assert_eq!(variance.running_sum_sq(), sum_sq.as_slice());
        assert_eq!(variance.state.buffer.total_written(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected_without_mutation() {
        let mut variance = IncrementalVarianceFeature::new("v", 0, 2).unwrap();
        variance.compute_output(&[&[1.0, 2.0]]).unwrap();
        assert!(variance.compute_output(&[&[1.0, 2.0, 3.0]]).is_err());
        assert_eq!(variance.running_sum(), &[1.0, 2.0]);
    }

    #[test]
    fn test_per_dimension_independence() {
        let mut variance = IncrementalVarianceFeature::new("v", 0, 2).unwrap();
        variance.compute_output(&[&[1.0, 10.0]]).unwrap();
        variance.compute_output(&[&[3.0, 10.0]]).unwrap();
        let out = variance.compute_output(&[&[5.0, 10.0]]).unwrap();
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn test_reset_restarts_warm_up() {
        let mut variance = IncrementalVarianceFeature::new("v", 0, 2).unwrap();
        for v in [4.0, 9.0, -2.0] {
            variance.compute_output(&[&[v]]).unwrap();
        }
        variance.reset();
        assert_eq!(variance.output_dimension(), None);
        assert_eq!(variance.compute_output(&[&[1.0]]).unwrap(), vec![0.25]);
    }

    proptest! {
        #[test]
        fn test_matches_recompute_after_warm_up(
            window in 1usize..8,
            values in prop::collection::vec(-100.0f64..100.0, 8..60),
        ) {
            let mut incremental = IncrementalVarianceFeature::new("v", 0, window).unwrap();
            let mut recomputed = VarianceFeature::new("r", 0, window).unwrap();
            for (i, v) in values.iter().enumerate() {
                let fast = incremental.compute_output(&[&[*v]]).unwrap()[0];
                let slow = recomputed.compute_output(&[&[*v]]).unwrap()[0];
                prop_assert!((fast - slow).abs() < 1e-6, "step {}: {} vs {}", i, fast, slow);

                if i + 1 >= window {
                    let literal = population_variance(&values[i + 1 - window..=i]);
                    prop_assert!((fast - literal).abs() < 1e-6, "step {}: {} vs {}", i, fast, literal);
                }
            }
        }
    }
}
