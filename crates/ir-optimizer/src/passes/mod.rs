//! Concrete Passes

mod const_fold;
mod dce;
mod dead_store;
mod global_dce;
mod inliner;
mod loop_vectorize;
mod slp_vectorize;
mod verifier;

pub use const_fold::ConstantFolding;
pub use dce::DeadCodeElimination;
pub use dead_store::DeadStoreElimination;
pub use global_dce::GlobalDce;
pub use inliner::Inliner;
pub use loop_vectorize::LoopVectorizer;
pub use slp_vectorize::SlpVectorizer;
pub use verifier::Verifier;
