//! Feature Factory
//!
//! Turns a feature description `[id, kind, input, window]` into a feature,
//! resolving the input against features declared before it.

use crate::{
    Feature, FeatureError, FeatureId, FeatureKind, FeatureSet, IncrementalMeanFeature,
    IncrementalVarianceFeature, InputFeature, MeanFeature, VarianceFeature,
};

type Constructor = fn(&[&str], &FeatureSet) -> Result<Box<dyn Feature>, FeatureError>;

/// Kind tag to constructor
const REGISTRY: &[(FeatureKind, Constructor)] = &[
    (FeatureKind::Input, new_input),
    (FeatureKind::Mean, new_mean),
    (FeatureKind::IncrementalMean, new_incremental_mean),
    (FeatureKind::Variance, new_variance),
    (FeatureKind::IncrementalVariance, new_incremental_variance),
];

fn new_input(params: &[&str], previous: &FeatureSet) -> Result<Box<dyn Feature>, FeatureError> {
    boxed(InputFeature::create(params, previous))
}

fn new_mean(params: &[&str], previous: &FeatureSet) -> Result<Box<dyn Feature>, FeatureError> {
    boxed(MeanFeature::create(params, previous))
}

fn new_incremental_mean(params: &[&str], previous: &FeatureSet) -> Result<Box<dyn Feature>, FeatureError> {
    boxed(IncrementalMeanFeature::create(params, previous))
}

fn new_variance(params: &[&str], previous: &FeatureSet) -> Result<Box<dyn Feature>, FeatureError> {
    boxed(VarianceFeature::create(params, previous))
}

fn new_incremental_variance(params: &[&str], previous: &FeatureSet) -> Result<Box<dyn Feature>, FeatureError> {
    boxed(IncrementalVarianceFeature::create(params, previous))
}

fn boxed<F: Feature + 'static>(feature: Result<F, FeatureError>) -> Result<Box<dyn Feature>, FeatureError> {
    feature.map(|f| Box::new(f) as Box<dyn Feature>)
}

/// Build a feature from its description
///
/// `previous` is only read, so a failed construction leaves it as it was.
pub fn create_feature<S: AsRef<str>>(params: &[S], previous: &FeatureSet) -> Result<Box<dyn Feature>, FeatureError> {
    let params: Vec<&str> = params.iter().map(AsRef::as_ref).collect();
    let tag = params.get(1).copied().ok_or(FeatureError::MalformedParameter {
        name: "kind",
        value: String::new(),
    })?;
    let (_, constructor) = REGISTRY
        .iter()
        .find(|(kind, _)| kind.tag() == tag)
        .ok_or_else(|| FeatureError::UnknownKind(tag.to_string()))?;
    constructor(&params, previous)
}

pub(crate) fn expect_arity(params: &[&str], arity: usize, kind: FeatureKind) -> Result<(), FeatureError> {
    if params.len() != arity {
        return Err(FeatureError::MalformedParameter {
            name: "arity",
            value: format!("{} expects {} fields, got {}", kind, arity, params.len()),
        });
    }
    Ok(())
}

/// Given id, or a synthesized one when the id field is empty
pub(crate) fn feature_id(token: &str, kind: FeatureKind, previous: &FeatureSet) -> String {
    if token.is_empty() {
        previous.synthesize_id(kind)
    } else {
        token.to_string()
    }
}

pub(crate) fn parse_positive(name: &'static str, token: &str) -> Result<usize, FeatureError> {
    match token.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(FeatureError::MalformedParameter {
            name,
            value: token.to_string(),
        }),
    }
}

pub(crate) fn resolve_input(token: &str, previous: &FeatureSet) -> Result<FeatureId, FeatureError> {
    previous
        .lookup(token)
        .ok_or_else(|| FeatureError::UnresolvedReference(token.to_string()))
}

/// Fields of `[id, kind, input, window]`
pub(crate) fn parse_windowed(
    kind: FeatureKind,
    params: &[&str],
    previous: &FeatureSet,
) -> Result<(String, FeatureId, usize), FeatureError> {
    expect_arity(params, 4, kind)?;
    let input = resolve_input(params[2], previous)?;
    let window = parse_positive("window", params[3])?;
    Ok((feature_id(params[0], kind, previous), input, window))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_input() -> FeatureSet {
        let mut set = FeatureSet::new();
        set.add_description(&["X", "input", "2"]).unwrap();
        set
    }

    #[test]
    fn test_resolution_in_declaration_order() {
        let mut set = with_input();
        let a = set.add_description(&["A", "mean", "X", "4"]).unwrap();

        let b = create_feature(&["B", "variance", "A", "4"], &set).unwrap();
        assert_eq!(b.id(), "B");
        assert_eq!(b.kind(), FeatureKind::Variance);
        assert_eq!(b.inputs(), &[a]);
    }

    #[test]
    fn test_unresolved_reference() {
        let set = FeatureSet::new();
        let err = create_feature(&["B", "variance", "Z", "4"], &set).unwrap_err();
        assert_eq!(err, FeatureError::UnresolvedReference("Z".into()));
        assert!(set.is_empty());
    }

    #[test]
    fn test_malformed_window() {
        let set = with_input();
        for window in ["four", "-1", "0", ""] {
            let err = create_feature(&["B", "incremental_variance", "X", window], &set).unwrap_err();
            assert!(matches!(err, FeatureError::MalformedParameter { name: "window", .. }));
        }
    }

    #[test]
    fn test_wrong_arity() {
        let set = with_input();
        let err = create_feature(&["B", "mean", "X"], &set).unwrap_err();
        assert!(matches!(err, FeatureError::MalformedParameter { name: "arity", .. }));
    }

    #[test]
    fn test_unknown_kind() {
        let set = with_input();
        let err = create_feature(&["B", "median", "X", "3"], &set).unwrap_err();
        assert_eq!(err, FeatureError::UnknownKind("median".into()));
    }

    #[test]
    fn test_synthesized_id() {
        let set = with_input();
        let feature = create_feature(&["", "incremental_mean", "X", "3"], &set).unwrap();
        assert_eq!(feature.id(), "incremental_mean_1");
    }

    #[test]
    fn test_every_kind_registered() {
        for kind in FeatureKind::ALL {
            assert!(REGISTRY.iter().any(|(k, _)| *k == kind), "{} missing", kind);
        }
    }
}
