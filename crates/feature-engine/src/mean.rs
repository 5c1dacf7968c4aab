//! Windowed Mean Features

use crate::factory::parse_windowed;
use crate::feature::{emplace_binary, emplace_delay, resolved_input, single_input, sum_taps, window_divisor};
use crate::window::WindowState;
use crate::{Feature, FeatureError, FeatureId, FeatureKind, FeatureOutputs, FeatureSet, WindowStatistics};
use model_graph::{AccumulatorNode, BinaryOp, CoordinateList, Model};

/// Mean over the last `window` samples, recomputed from the buffer
#[derive(Debug, Clone)]
pub struct MeanFeature {
    state: WindowState,
}

impl MeanFeature {
    /// Create a feature over `window` samples of feature `input`
    pub fn new(id: impl Into<String>, input: FeatureId, window: usize) -> Result<Self, FeatureError> {
        Ok(Self {
            state: WindowState::new(id, input, window)?,
        })
    }

    /// Build from `[id, "mean", input, window]`
    pub fn create(params: &[&str], previous: &FeatureSet) -> Result<Self, FeatureError> {
        let (id, input, window) = parse_windowed(FeatureKind::Mean, params, previous)?;
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

impl Feature for MeanFeature {
    fn id(&self) -> &str {
        &self.state.id
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Mean
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
        Ok(WindowStatistics::compute(&self.state.buffer, self.state.window, sample.len()).mean)
    }

    fn add_to_model(&self, model: &mut Model, outputs: &FeatureOutputs) -> Result<CoordinateList, FeatureError> {
        let input = resolved_input(&self.state.id, self.state.input, outputs)?;
        let divisor = window_divisor(model, self.state.window, input.len())?;

        let (buffer, delay) = emplace_delay(model, input, self.state.window)?;
        let (sum, _) = sum_taps(model, &delay, &buffer)?;
        emplace_binary(model, &sum, &divisor, BinaryOp::Divide)
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Mean over the last `window` samples from a running sum, O(D) per sample
#[derive(Debug, Clone)]
pub struct IncrementalMeanFeature {
    state: WindowState,
    running_sum: Vec<f64>,
}

impl IncrementalMeanFeature {
    /// Create a feature over `window` samples of feature `input`
    pub fn new(id: impl Into<String>, input: FeatureId, window: usize) -> Result<Self, FeatureError> {
        Ok(Self {
            state: WindowState::new(id, input, window)?,
            running_sum: Vec::new(),
        })
    }

    /// Build from `[id, "incremental_mean", input, window]`
    pub fn create(params: &[&str], previous: &FeatureSet) -> Result<Self, FeatureError> {
        let (id, input, window) = parse_windowed(FeatureKind::IncrementalMean, params, previous)?;
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

impl Feature for IncrementalMeanFeature {
    fn id(&self) -> &str {
        &self.state.id
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::IncrementalMean
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

        let old = self.state.departing(sample.len());
        self.state.push(sample)?;
        self.running_sum.resize(sample.len(), 0.0);

        let window = self.state.window as f64;
        let result = self
            .running_sum
            .iter_mut()
            .zip(sample.iter().zip(&old))
            .map(|(sum, (new, old))| {
                *sum += new - old;
                *sum / window
            })
            .collect();
        Ok(result)
    }

    fn add_to_model(&self, model: &mut Model, outputs: &FeatureOutputs) -> Result<CoordinateList, FeatureError> {
        let input = resolved_input(&self.state.id, self.state.input, outputs)?;
        let window = self.state.window;
        let divisor = window_divisor(model, window, input.len())?;

        let (buffer, delay) = emplace_delay(model, input, window + 1)?;
        let oldest = delay.delayed_output(&buffer, window)?;
        let diff = emplace_binary(model, input, &oldest, BinaryOp::Subtract)?;
        let running_sum = model.emplace(AccumulatorNode::new(diff))?;
        emplace_binary(model, &running_sum, &divisor, BinaryOp::Divide)
    }

    fn reset(&mut self) {
        self.state.reset();
        self.running_sum.clear();
    }
}
