//! Shared Window State

use crate::{FeatureError, FeatureId};
use ring_buffer::SampleBuffer;

/// Id, input and sample history shared by all windowed features
#[derive(Debug, Clone)]
pub(crate) struct WindowState {
    pub id: String,
    pub input: FeatureId,
    pub window: usize,
    pub buffer: SampleBuffer,
    pub output_dimension: Option<usize>,
}

impl WindowState {
    pub fn new(id: impl Into<String>, input: FeatureId, window: usize) -> Result<Self, FeatureError> {
        Ok(Self {
            id: id.into(),
            input,
            window,
            buffer: SampleBuffer::new(window)?,
            output_dimension: None,
        })
    }

    /// Reject a sample before any state is touched
    pub fn validate(&self, sample: &[f64]) -> Result<(), FeatureError> {
        if sample.is_empty() {
            return Err(FeatureError::InvalidInput(format!(
                "{}: input of size zero",
                self.id
            )));
        }
        self.buffer.check_dimension(sample.len())?;
        Ok(())
    }

    /// Sample about to leave the window
    ///
    /// While the window is still filling there is no such sample and the zero
    /// vector stands in for it. This understates the statistics over the
    /// first `window - 1` samples.
    pub fn departing(&self, dimension: usize) -> Vec<f64> {
        let mut old = self
            .buffer
            .delayed(self.window - 1)
            .map(<[f64]>::to_vec)
            .unwrap_or_default();
        old.resize(dimension, 0.0);
        old
    }

    pub fn push(&mut self, sample: &[f64]) -> Result<(), FeatureError> {
        self.buffer.push(sample)?;
        self.output_dimension = Some(sample.len());
        Ok(())
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.output_dimension = None;
    }
}
