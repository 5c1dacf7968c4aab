//! Input Feature

use crate::factory::{expect_arity, feature_id, parse_positive};
use crate::feature::single_input;
use crate::{Feature, FeatureError, FeatureId, FeatureKind, FeatureOutputs, FeatureSet};
use model_graph::{CoordinateList, InputNode, Model};

/// Entry point of the raw sample stream
#[derive(Debug, Clone)]
pub struct InputFeature {
    id: String,
    dimension: usize,
}

impl InputFeature {
    pub fn new(id: impl Into<String>, dimension: usize) -> Self {
        Self {
            id: id.into(),
            dimension,
        }
    }

    /// Build from `[id, "input", dimension]`
    pub fn create(params: &[&str], previous: &FeatureSet) -> Result<Self, FeatureError> {
        expect_arity(params, 3, FeatureKind::Input)?;
        let dimension = parse_positive("dimension", params[2])?;
        Ok(Self::new(feature_id(params[0], FeatureKind::Input, previous), dimension))
    }
}

impl Feature for InputFeature {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Input
    }

    fn inputs(&self) -> &[FeatureId] {
        &[]
    }

    fn output_dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn compute_output(&mut self, inputs: &[&[f64]]) -> Result<Vec<f64>, FeatureError> {
        let sample = single_input(&self.id, inputs)?;
        if sample.len() != self.dimension {
            return Err(FeatureError::InvalidInput(format!(
                "{}: expected {} values, got {}",
                self.id,
                self.dimension,
                sample.len()
            )));
        }
        Ok(sample.to_vec())
    }

    fn add_to_model(&self, model: &mut Model, _outputs: &FeatureOutputs) -> Result<CoordinateList, FeatureError> {
        Ok(model.emplace(InputNode::new(self.dimension))?)
    }

    fn reset(&mut self) {}
}
