//! Feature Engine
//!
//! Windowed streaming features. Every feature can be evaluated eagerly, one
//! sample at a time, or compiled into an equivalent subgraph of a
//! [`model_graph::Model`]. Features are built from textual descriptions by a
//! closed factory registry and owned by a [`FeatureSet`].

mod error;
mod factory;
mod feature;
mod input;
mod mean;
mod set;
mod statistics;
mod variance;
mod window;

pub use error::FeatureError;
pub use factory::create_feature;
pub use feature::{Feature, FeatureId, FeatureKind, FeatureOutputs};
pub use input::InputFeature;
pub use mean::{IncrementalMeanFeature, MeanFeature};
pub use set::{CompiledFeatures, FeatureSet};
pub use statistics::WindowStatistics;
pub use variance::{IncrementalVarianceFeature, VarianceFeature};
