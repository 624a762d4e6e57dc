pub mod cache;
pub mod evaluator;

pub use cache::FitnessCache;
pub use evaluator::{Evaluation, FitnessEvaluator};
