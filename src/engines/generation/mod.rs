pub mod genome;
pub mod grammar;
pub mod operators;
pub mod selection;
pub mod hall_of_fame;
pub mod evolution_engine;

pub use genome::{Genotype, Token};
pub use grammar::Grammar;
pub use hall_of_fame::{EliteIndividual, HallOfFame};
pub use evolution_engine::{
    ConsoleProgressCallback, EvolutionEngine, EvolutionResult, NoProgress, ProgressCallback,
};

/// Attempt budget shared by every stochastic retry loop: random genotype
/// generation, gene mutation, crossover, and per-stage offspring retries.
pub(crate) const MAX_ATTEMPTS: usize = 100;
