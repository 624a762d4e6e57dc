use super::traits::ConfigSection;
use crate::error::BtLearnError;
use serde::{Deserialize, Serialize};

/// Parameters for the genetic programming run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpConfig {
    /// Target length of initial random genotypes.
    pub ind_start_length: usize,
    /// Number of individuals in the population.
    pub n_population: usize,
    /// Fraction of the population selected as crossover parents.
    pub f_crossover: f64,
    /// Offspring pairs produced per two crossover parents.
    pub n_offspring_crossover: usize,
    /// Fraction of the population selected as mutation parents.
    pub f_mutation: f64,
    /// Mutants produced per mutation parent.
    pub n_offspring_mutation: usize,
    pub parent_selection: SelectionMethod,
    pub survivor_selection: SelectionMethod,
    /// Fraction of the population kept unconditionally as elites.
    pub f_elites: f64,
    /// Fraction of parents that may survive into the next generation.
    pub f_parents: f64,
    /// Crossover offspring may also be selected for mutation.
    pub mutate_co_offspring: bool,
    /// Crossover parents may also be selected for mutation.
    pub mutate_co_parents: bool,
    /// Probability that a mutation inserts a token.
    pub mutation_p_add: f64,
    /// Probability that a mutation deletes a token.
    pub mutation_p_delete: f64,
    /// Offspring may be identical to an individual of the previous generation.
    pub allow_identical: bool,
    pub n_generations: usize,
    /// Bucket count of the fitness cache.
    pub hash_table_size: usize,
    pub rerun_fitness: RerunPolicy,
    pub hall_of_fame_size: usize,
    /// Base directory for run logs.
    pub log_dir: String,
    /// Name of the run, used for the log folder.
    pub log_name: String,
    /// Render the best individual through the evaluator at the end of the run.
    pub render_best: bool,
    /// Render every individual of the last generation.
    pub render_last_generation: bool,
    /// Log the full population each generation.
    pub verbose: bool,
    /// Seed for the run's random number generator; entropy-seeded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Policy for re-evaluating a genotype that already has cached samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RerunPolicy {
    /// Reuse cached samples, never re-evaluate.
    Never,
    /// Re-evaluate with probability 1/n^2 given n cached samples.
    Probabilistic,
    /// Re-evaluate on every fitness request.
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMethod {
    Elitism,
    Tournament,
    Rank,
    Random,
    All,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            ind_start_length: 5,
            n_population: 8,
            f_crossover: 0.5,
            n_offspring_crossover: 1,
            f_mutation: 0.5,
            n_offspring_mutation: 1,
            parent_selection: SelectionMethod::Tournament,
            survivor_selection: SelectionMethod::Tournament,
            f_elites: 0.1,
            f_parents: 1.0,
            mutate_co_offspring: false,
            mutate_co_parents: false,
            mutation_p_add: 0.4,
            mutation_p_delete: 0.3,
            allow_identical: false,
            n_generations: 100,
            hash_table_size: 100_000,
            rerun_fitness: RerunPolicy::Probabilistic,
            hall_of_fame_size: 10,
            log_dir: "logs".to_string(),
            log_name: "1".to_string(),
            render_best: true,
            render_last_generation: false,
            verbose: false,
            seed: None,
        }
    }
}

impl GpConfig {
    pub fn n_crossover_parents(&self) -> usize {
        (self.f_crossover * self.n_population as f64).round() as usize
    }

    pub fn n_mutation_parents(&self) -> usize {
        (self.f_mutation * self.n_population as f64).round() as usize
    }

    pub fn n_elites(&self) -> usize {
        (self.f_elites * self.n_population as f64).round() as usize
    }

    pub fn n_surviving_parents(&self) -> usize {
        (self.f_parents * self.n_population as f64).round() as usize
    }
}

impl ConfigSection for GpConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), BtLearnError> {
        if self.n_population < 2 {
            return Err(BtLearnError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        if self.ind_start_length < 1 {
            return Err(BtLearnError::Configuration(
                "Initial genotype length must be at least 1".to_string(),
            ));
        }
        if self.n_generations < 1 {
            return Err(BtLearnError::Configuration(
                "Number of generations must be at least 1".to_string(),
            ));
        }
        if self.hash_table_size < 1 {
            return Err(BtLearnError::Configuration(
                "Hash table size must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("f_crossover", self.f_crossover),
            ("f_mutation", self.f_mutation),
            ("f_elites", self.f_elites),
            ("f_parents", self.f_parents),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BtLearnError::Configuration(format!(
                    "{} must be between 0 and 1",
                    name
                )));
            }
        }
        if self.mutation_p_add < 0.0 || self.mutation_p_delete < 0.0 {
            return Err(BtLearnError::Configuration(
                "Mutation probabilities must not be negative".to_string(),
            ));
        }
        if self.mutation_p_add + self.mutation_p_delete > 1.0 {
            return Err(BtLearnError::Configuration(
                "Sum of the mutation probabilities must not exceed 1".to_string(),
            ));
        }
        if self.n_crossover_parents() % 2 != 0 {
            return Err(BtLearnError::Configuration(
                "Number of crossover parents must be an even number".to_string(),
            ));
        }
        Ok(())
    }
}
