//! Similarity matching between query parts and the cached catalog.

pub mod engine;
pub mod similarity;

pub use engine::{MatchWeights, MatchingEngine};
pub use similarity::TfIdfIndex;
