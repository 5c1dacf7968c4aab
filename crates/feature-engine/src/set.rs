//! Feature Set
//!
//! Owns every constructed feature. Features refer to their inputs by index
//! into the set, so the set alone controls their lifetime.

use crate::{create_feature, Feature, FeatureError, FeatureId, FeatureKind, FeatureOutputs};
use model_graph::{CoordinateList, Model};
use std::collections::HashMap;
use tracing::{debug, info};

/// Model assembled from a feature set
#[derive(Debug, Clone)]
pub struct CompiledFeatures {
    /// The dataflow graph
    pub model: Model,
    /// Output handle of every feature
    pub outputs: FeatureOutputs,
    /// Output handle of the last declared feature
    pub output: CoordinateList,
}

impl CompiledFeatures {
    pub fn output_of(&self, id: FeatureId) -> Option<&CoordinateList> {
        self.outputs.get(&id)
    }
}

/// Arena of features in declaration order
#[derive(Debug, Default)]
pub struct FeatureSet {
    features: Vec<Box<dyn Feature>>,
    ids: HashMap<String, FeatureId>,
    outputs: Vec<Vec<f64>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from descriptions, in order
    pub fn from_descriptions<D, S>(descriptions: impl IntoIterator<Item = D>) -> Result<Self, FeatureError>
    where
        D: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for description in descriptions {
            set.add_description(description.as_ref())?;
        }
        info!("Created feature set with {} features", set.len());
        Ok(set)
    }

    /// Construct a feature from its description and add it
    ///
    /// On failure the set is left exactly as it was.
    pub fn add_description<S: AsRef<str>>(&mut self, params: &[S]) -> Result<FeatureId, FeatureError> {
        let feature = create_feature(params, self)?;
        self.insert(feature)
    }

    /// Add an already constructed feature
    pub fn insert(&mut self, feature: Box<dyn Feature>) -> Result<FeatureId, FeatureError> {
        let id = feature.id().to_string();
        if id.is_empty() || self.ids.contains_key(&id) {
            return Err(FeatureError::DuplicateId(id));
        }
        if let Some(&input) = feature.inputs().iter().find(|&&input| input >= self.features.len()) {
            return Err(FeatureError::UnresolvedReference(format!("#{}", input)));
        }

        let index = self.features.len();
        debug!("Adding {} feature {} as #{}", feature.kind(), id, index);
        self.ids.insert(id, index);
        self.features.push(feature);
        self.outputs.push(Vec::new());
        Ok(index)
    }

    /// Index of the feature with exactly this id
    pub fn lookup(&self, id: &str) -> Option<FeatureId> {
        self.ids.get(id).copied()
    }

    pub fn get(&self, index: FeatureId) -> Option<&dyn Feature> {
        self.features.get(index).map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &dyn Feature)> {
        self.features.iter().enumerate().map(|(i, f)| (i, f.as_ref()))
    }

    /// Id for a feature declared without one
    pub fn synthesize_id(&self, kind: FeatureKind) -> String {
        let mut n = self.features.len();
        loop {
            let id = format!("{}_{}", kind.tag(), n);
            if !self.ids.contains_key(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Latest eager output of a feature
    pub fn output(&self, index: FeatureId) -> Option<&[f64]> {
        self.outputs.get(index).map(Vec::as_slice)
    }

    /// Evaluate every feature on a new sample and return the output of the
    /// last one
    ///
    /// Features without inputs receive the raw sample. If a feature fails,
    /// the features before it have already consumed the sample.
    pub fn process_sample(&mut self, sample: &[f64]) -> Result<Vec<f64>, FeatureError> {
        if self.features.is_empty() {
            return Err(FeatureError::IllegalState("empty feature set".to_string()));
        }

        for index in 0..self.features.len() {
            let input_ids = self.features[index].inputs().to_vec();
            let output = if input_ids.is_empty() {
                self.features[index].compute_output(&[sample])?
            } else {
                let inputs: Vec<&[f64]> = input_ids.iter().map(|&i| self.outputs[i].as_slice()).collect();
                self.features[index].compute_output(&inputs)?
            };
            self.outputs[index] = output;
        }
        Ok(self.outputs.last().cloned().unwrap_or_default())
    }

    /// Clear all eager state
    pub fn reset(&mut self) {
        for feature in &mut self.features {
            feature.reset();
        }
        for output in &mut self.outputs {
            output.clear();
        }
    }

    /// Assemble the dataflow model of all features, in declaration order
    pub fn build_model(&self) -> Result<CompiledFeatures, FeatureError> {
        if self.features.is_empty() {
            return Err(FeatureError::IllegalState("empty feature set".to_string()));
        }

        let mut model = Model::new();
        let mut outputs = FeatureOutputs::new();
        let mut output = CoordinateList::default();
        for (index, feature) in self.features.iter().enumerate() {
            output = feature.add_to_model(&mut model, &outputs)?;
            debug!("Compiled feature {} to {} outputs", feature.id(), output.len());
            outputs.insert(index, output.clone());
        }

        info!("Built model with {} nodes from {} features", model.len(), self.len());
        Ok(CompiledFeatures { model, outputs, output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IncrementalVarianceFeature, InputFeature};
    use model_graph::ModelExecutor;

    fn descriptions() -> Vec<Vec<&'static str>> {
        vec![
            vec!["X", "input", "2"],
            vec!["A", "mean", "X", "4"],
            vec!["B", "variance", "A", "4"],
        ]
    }

    #[test]
    fn test_from_descriptions() {
        let set = FeatureSet::from_descriptions(descriptions()).unwrap();
        assert_eq!(set.len(), 3);
        let a = set.lookup("A").unwrap();
        let b = set.get(set.lookup("B").unwrap()).unwrap();
        assert_eq!(b.inputs(), &[a]);
    }

    #[test]
    fn test_failed_description_leaves_set_usable() {
        let mut set = FeatureSet::from_descriptions(descriptions()).unwrap();
        assert!(set.add_description(&["C", "variance", "Z", "4"]).is_err());
        assert!(set.add_description(&["A", "mean", "X", "2"]).is_err());
        assert_eq!(set.len(), 3);
        assert!(set.lookup("C").is_none());
        assert!(set.process_sample(&[1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_forward_reference_fails() {
        let mut set = FeatureSet::new();
        set.add_description(&["X", "input", "1"]).unwrap();
        let err = set.add_description(&["A", "mean", "B", "2"]).unwrap_err();
        assert_eq!(err, FeatureError::UnresolvedReference("B".into()));
    }

    #[test]
    fn test_insert_rejects_dangling_input() {
        let mut set = FeatureSet::new();
        let feature = IncrementalVarianceFeature::new("v", 3, 2).unwrap();
        assert!(matches!(
            set.insert(Box::new(feature)),
            Err(FeatureError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_process_sample_chains_features() {
        let mut set = FeatureSet::from_descriptions(vec![
            vec!["X", "input", "1"],
            vec!["V", "incremental_variance", "X", "2"],
        ])
        .unwrap();
        let trace: Vec<f64> = [1.0, 3.0, 5.0]
            .iter()
            .map(|v| set.process_sample(&[*v]).unwrap()[0])
            .collect();
        assert_eq!(trace, vec![0.25, 1.0, 1.0]);
        assert_eq!(set.output(0), Some(&[5.0][..]));
    }

    #[test]
    fn test_build_model_matches_eager() {
        let mut set = FeatureSet::from_descriptions(descriptions()).unwrap();
        let compiled = set.build_model().unwrap();
        let mut exec = ModelExecutor::new(&compiled.model);

        for i in 0..12 {
            let sample = [i as f64 * 0.5, (i * i) as f64 - 3.0];
            let eager = set.process_sample(&sample).unwrap();
            let graph = exec.compute(&sample, &compiled.output).unwrap();
            for (e, g) in eager.iter().zip(&graph) {
                assert!((e - g).abs() < 1e-9, "step {}: {} vs {}", i, e, g);
            }
        }
    }

    #[test]
    fn test_missing_upstream_output_when_built_out_of_order() {
        let mut set = FeatureSet::new();
        set.insert(Box::new(InputFeature::new("X", 1))).unwrap();
        let v = set.add_description(&["V", "incremental_variance", "X", "3"]).unwrap();

        let mut model = Model::new();
        let err = set.get(v).unwrap().add_to_model(&mut model, &FeatureOutputs::new()).unwrap_err();
        assert_eq!(err, FeatureError::MissingInput { feature: "V".into(), input: 0 });
    }

    #[test]
    fn test_empty_set() {
        let mut set = FeatureSet::new();
        assert!(matches!(set.process_sample(&[1.0]), Err(FeatureError::IllegalState(_))));
        assert!(matches!(set.build_model(), Err(FeatureError::IllegalState(_))));
    }
}
