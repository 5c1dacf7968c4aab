//! Feature Interface

use crate::FeatureError;
use model_graph::{BinaryNode, BinaryOp, ConstantNode, CoordinateList, DelayNode, Model, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of a feature in its owning [`FeatureSet`](crate::FeatureSet)
pub type FeatureId = usize;

/// Graph handles of already compiled features
pub type FeatureOutputs = HashMap<FeatureId, CoordinateList>;

/// Closed set of feature kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    Input,
    Mean,
    IncrementalMean,
    Variance,
    IncrementalVariance,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::Input,
        FeatureKind::Mean,
        FeatureKind::IncrementalMean,
        FeatureKind::Variance,
        FeatureKind::IncrementalVariance,
    ];

    /// Tag used in feature descriptions
    pub fn tag(&self) -> &'static str {
        match self {
            FeatureKind::Input => "input",
            FeatureKind::Mean => "mean",
            FeatureKind::IncrementalMean => "incremental_mean",
            FeatureKind::Variance => "variance",
            FeatureKind::IncrementalVariance => "incremental_variance",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A streaming computation with an eager form and a dataflow-graph form
///
/// Both forms must produce the same values for the same input history. They
/// are implemented independently: the eager path updates cached state in
/// place, while `add_to_model` only composes graph primitives.
pub trait Feature: fmt::Debug + Send {
    /// Unique id within the owning set
    fn id(&self) -> &str;

    fn kind(&self) -> FeatureKind;

    /// Upstream features, in order
    fn inputs(&self) -> &[FeatureId];

    /// Output width, known once the first sample was evaluated
    fn output_dimension(&self) -> Option<usize>;

    /// Evaluate one sample given the current outputs of `inputs()`
    ///
    /// A failed call leaves the feature's state untouched.
    fn compute_output(&mut self, inputs: &[&[f64]]) -> Result<Vec<f64>, FeatureError>;

    /// Emit an equivalent subgraph and return its output handle
    fn add_to_model(&self, model: &mut Model, outputs: &FeatureOutputs) -> Result<CoordinateList, FeatureError>;

    /// Forget all eager state
    fn reset(&mut self);
}

/// The only upstream value of a single-input feature
pub(crate) fn single_input<'a>(feature: &str, inputs: &[&'a [f64]]) -> Result<&'a [f64], FeatureError> {
    match inputs {
        [input] => Ok(input),
        _ => Err(FeatureError::IllegalState(format!(
            "{} expects 1 input, got {}",
            feature,
            inputs.len()
        ))),
    }
}

/// Compiled handle of `input`, which must precede `feature` in build order
pub(crate) fn resolved_input<'a>(
    feature: &str,
    input: FeatureId,
    outputs: &'a FeatureOutputs,
) -> Result<&'a CoordinateList, FeatureError> {
    outputs.get(&input).ok_or_else(|| FeatureError::MissingInput {
        feature: feature.to_string(),
        input,
    })
}

/// Constant `window` broadcast to `width` elements
pub(crate) fn window_divisor(model: &mut Model, window: usize, width: usize) -> Result<CoordinateList, FeatureError> {
    let divisor = model.emplace(ConstantNode::new(vec![window as f64]))?;
    Ok(divisor.broadcast(width)?)
}

/// Emplace a shift register of `depth` samples and read back the node
pub(crate) fn emplace_delay(
    model: &mut Model,
    input: &CoordinateList,
    depth: usize,
) -> Result<(CoordinateList, DelayNode), FeatureError> {
    let output = model.emplace(DelayNode::new(input.clone(), depth))?;
    let delay = model
        .last_node()
        .and_then(Node::as_delay)
        .cloned()
        .ok_or_else(|| FeatureError::IllegalState("last emplaced node is not a delay".to_string()))?;
    Ok((output, delay))
}

pub(crate) fn emplace_binary(
    model: &mut Model,
    lhs: &CoordinateList,
    rhs: &CoordinateList,
    op: BinaryOp,
) -> Result<CoordinateList, FeatureError> {
    Ok(model.emplace(BinaryNode::new(lhs.clone(), rhs.clone(), op))?)
}

/// Sum of all `depth` taps of a shift register
pub(crate) fn sum_taps(
    model: &mut Model,
    delay: &DelayNode,
    output: &CoordinateList,
) -> Result<(CoordinateList, Vec<CoordinateList>), FeatureError> {
    let taps = (0..delay.window)
        .map(|tap| delay.delayed_output(output, tap))
        .collect::<Result<Vec<_>, _>>()?;
    let mut sum = taps[0].clone();
    for tap in &taps[1..] {
        sum = emplace_binary(model, &sum, tap, BinaryOp::Add)?;
    }
    Ok((sum, taps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in FeatureKind::ALL {
            assert_eq!(FeatureKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(FeatureKind::from_tag("median"), None);
    }

    #[test]
    fn test_single_input_arity() {
        let a = [1.0];
        assert!(single_input("f", &[&a]).is_ok());
        assert!(matches!(single_input("f", &[]), Err(FeatureError::IllegalState(_))));
    }

    #[test]
    fn test_missing_input() {
        let outputs = FeatureOutputs::new();
        let err = resolved_input("B", 0, &outputs).unwrap_err();
        assert_eq!(err, FeatureError::MissingInput { feature: "B".into(), input: 0 });
    }
}
