use std::path::Path;

use crate::engines::generation::genome::Genotype;
use crate::error::BtLearnError;

/// Outcome of a single evaluation episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub fitness: f64,
    /// Whether the individual solved the task.
    pub completed: bool,
}

/// External task evaluator.
///
/// Implementations run one episode of the task with the given genotype and
/// score it. Evaluation may be stochastic: repeated calls on the same
/// genotype are allowed to return different fitness values, which the driver
/// folds into the fitness cache as separate samples.
pub trait FitnessEvaluator {
    fn evaluate(&mut self, genotype: &Genotype) -> Result<Evaluation, BtLearnError>;

    /// Saves a graphical representation of the individual. The default does
    /// nothing; evaluators with a renderer override it.
    fn render(&self, _genotype: &Genotype, _path: &Path, _name: &str) -> Result<(), BtLearnError> {
        Ok(())
    }
}
