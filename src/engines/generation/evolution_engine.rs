use std::collections::HashSet;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::traits::ConfigSection;
use crate::config::{GpConfig, RerunPolicy};
use crate::data::logs;
use crate::engines::evaluation::cache::FitnessCache;
use crate::engines::evaluation::evaluator::FitnessEvaluator;
use crate::engines::generation::genome::{format_genotype, Genotype};
use crate::engines::generation::grammar::Grammar;
use crate::engines::generation::hall_of_fame::HallOfFame;
use crate::engines::generation::operators::{crossover_genome, mutate_gene};
use crate::engines::generation::selection::{elite_selection, select};
use crate::engines::generation::MAX_ATTEMPTS;
use crate::error::BtLearnError;

pub trait ProgressCallback {
    fn on_generation_start(&mut self, _generation: usize) {}
    fn on_generation_complete(&mut self, _generation: usize, _best_fitness: f64, _n_episodes: usize) {
    }
    fn on_individual_evaluated(&mut self, _individual: usize, _total: usize) {}
}

/// No-op callback for headless runs.
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_generation_complete(&mut self, generation: usize, best_fitness: f64, n_episodes: usize) {
        println!(
            "Generation {} complete. Best fitness: {:.4}, episodes: {}",
            generation, best_fitness, n_episodes
        );
    }
}

/// Final state of a finished run.
pub struct EvolutionResult {
    pub population: Vec<Genotype>,
    pub fitness: Vec<f64>,
    /// Best fitness per generation.
    pub best_fitness: Vec<f64>,
    /// Cumulative evaluation episodes per generation.
    pub n_episodes: Vec<usize>,
    pub best_individual: Genotype,
    /// First individual that completed the task, if any did.
    pub completed: Option<Genotype>,
}

/// Generational genetic programming driver.
///
/// Owns the fitness cache, the run's random number generator and the hall of
/// fame; borrows the grammar and drives the external evaluator. One engine
/// runs one search.
pub struct EvolutionEngine<E: FitnessEvaluator> {
    config: GpConfig,
    grammar: Grammar,
    evaluator: E,
    cache: FitnessCache,
    hall_of_fame: HallOfFame,
    rng: StdRng,
    hotstart_population: Option<Vec<Genotype>>,
    baseline: Option<Genotype>,
    completed: Option<Genotype>,
}

impl<E: FitnessEvaluator> EvolutionEngine<E> {
    /// Creates an engine. Configuration errors surface here, before any
    /// generation runs.
    pub fn new(config: GpConfig, grammar: Grammar, evaluator: E) -> Result<Self, BtLearnError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let cache = FitnessCache::new(config.hash_table_size);
        let hall_of_fame = HallOfFame::new(config.hall_of_fame_size);

        Ok(Self {
            config,
            grammar,
            evaluator,
            cache,
            hall_of_fame,
            rng,
            hotstart_population: None,
            baseline: None,
            completed: None,
        })
    }

    /// Starts the run from a previous population and reloads the cache
    /// export instead of clearing the logs.
    pub fn with_hotstart(mut self, population: Vec<Genotype>) -> Self {
        self.hotstart_population = Some(population);
        self
    }

    /// Injects a baseline individual at position 0 and keeps it available in
    /// every generation so the search can always source from it.
    pub fn with_baseline(mut self, baseline: Genotype) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn cache(&self) -> &FitnessCache {
        &self.cache
    }

    fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.log_dir)
    }

    /// Runs the configured number of generations and returns the final
    /// state. Per-generation operator exhaustion only reduces that
    /// generation's offspring count; it never aborts the run.
    pub fn run<C: ProgressCallback>(
        &mut self,
        callback: &mut C,
    ) -> Result<EvolutionResult, BtLearnError> {
        let log_dir = self.log_dir();
        let log_name = self.config.log_name.clone();

        if let Some(baseline) = &self.baseline {
            if !self.grammar.validate(baseline) {
                return Err(BtLearnError::InvalidGenotype(
                    "baseline individual does not satisfy the grammar".to_string(),
                ));
            }
        }
        if let Some(population) = &self.hotstart_population {
            if population.iter().any(|g| !self.grammar.validate(g)) {
                return Err(BtLearnError::InvalidGenotype(
                    "hotstart population contains an invalid genotype".to_string(),
                ));
            }
        }

        let mut population = match self.hotstart_population.take() {
            Some(population) => {
                self.cache.load(logs::cache_path(&log_dir, &log_name))?;
                population
            }
            None => {
                logs::clear_logs(&log_dir, &log_name)?;
                self.create_population()?
            }
        };

        if let Some(baseline) = self.baseline.clone() {
            if population.is_empty() {
                population.push(baseline);
            } else {
                population[0] = baseline;
            }
        }

        let mut fitness = Vec::with_capacity(population.len());
        for (i, individual) in population.iter().enumerate() {
            callback.on_individual_evaluated(i + 1, population.len());
            fitness.push(self.get_fitness(individual, RerunPolicy::Never)?);
        }

        let mut best_fitness = vec![max_fitness(&fitness)];
        let mut n_episodes = vec![self.cache.n_samples()];
        self.update_hall_of_fame(&population, &fitness);

        logs::log_fitness(&log_dir, &log_name, &fitness)?;
        logs::log_population(&log_dir, &log_name, 0, &population)?;
        log::info!("generation 0 best fitness {:.4}", best_fitness[0]);
        callback.on_generation_complete(0, best_fitness[0], n_episodes[0]);

        for generation in 1..self.config.n_generations {
            callback.on_generation_start(generation);

            if let Some(baseline) = self.baseline.clone() {
                if !population.contains(&baseline) {
                    population.push(baseline);
                }
            }

            if generation > 1 {
                // re-evaluate the carried population under the rerun policy
                fitness.clear();
                for individual in &population {
                    fitness.push(self.get_fitness(individual, self.config.rerun_fitness)?);
                }
            } else if population.len() > fitness.len() {
                // a re-appended baseline has no fitness entry yet
                for individual in &population[fitness.len()..] {
                    fitness.push(self.get_fitness(individual, self.config.rerun_fitness)?);
                }
            }

            let co_parents = self.crossover_parent_selection(&population, &fitness);
            let co_offspring = self.crossover(&population, &co_parents)?;
            for (i, individual) in co_offspring.iter().enumerate() {
                callback.on_individual_evaluated(i + 1, co_offspring.len());
                fitness.push(self.get_fitness(individual, self.config.rerun_fitness)?);
            }

            let mutation_parents =
                self.mutation_parent_selection(&population, &fitness, &co_parents, co_offspring.len());
            let mutation_pool: Vec<Genotype> = population
                .iter()
                .chain(co_offspring.iter())
                .cloned()
                .collect();
            let mutated_offspring = self.mutation(&mutation_pool, &mutation_parents)?;
            for (i, individual) in mutated_offspring.iter().enumerate() {
                callback.on_individual_evaluated(i + 1, mutated_offspring.len());
                fitness.push(self.get_fitness(individual, self.config.rerun_fitness)?);
            }

            let mut offspring = co_offspring;
            offspring.extend(mutated_offspring);
            let (survivors, survivor_fitness) =
                self.survivor_selection(&population, &fitness, &offspring);
            population = survivors;
            fitness = survivor_fitness;

            best_fitness.push(max_fitness(&fitness));
            n_episodes.push(self.cache.n_samples());
            self.update_hall_of_fame(&population, &fitness);

            logs::log_fitness(&log_dir, &log_name, &fitness)?;
            logs::log_population(&log_dir, &log_name, generation, &population)?;

            let best = best_index(&fitness);
            log::info!(
                "generation {} best fitness {:.4} ({} episodes)",
                generation,
                best_fitness[generation],
                n_episodes[generation]
            );
            log::debug!("best individual: {}", format_genotype(&population[best]));
            if self.config.verbose {
                for (individual, value) in population.iter().zip(&fitness) {
                    log::debug!("{:.4}  {}", value, format_genotype(individual));
                }
            }
            callback.on_generation_complete(
                generation,
                best_fitness[generation],
                n_episodes[generation],
            );
        }

        self.cache.export(logs::cache_path(&log_dir, &log_name))?;

        let best = best_index(&fitness);
        let best_individual = population[best].clone();
        logs::log_best_individual(&log_dir, &log_name, &best_individual)?;
        logs::log_best_fitness(&log_dir, &log_name, &best_fitness)?;
        logs::log_n_episodes(&log_dir, &log_name, &n_episodes)?;
        logs::log_settings(&log_dir, &log_name, &self.config)?;

        let folder = logs::get_log_folder(&log_dir, &log_name);
        if self.config.render_best {
            self.evaluator
                .render(&best_individual, &folder, "best_individual")?;
        }
        if self.config.render_last_generation {
            for (i, individual) in population.iter().enumerate() {
                self.evaluator
                    .render(individual, &folder, &format!("individual_{}", i))?;
            }
        }

        Ok(EvolutionResult {
            population,
            fitness,
            best_fitness,
            n_episodes,
            best_individual,
            completed: self.completed.clone(),
        })
    }

    /// Fitness from the cache where possible, otherwise from the evaluator.
    /// A fresh sample is folded into the cache before the mean is computed.
    fn get_fitness(
        &mut self,
        individual: &Genotype,
        rerun: RerunPolicy,
    ) -> Result<f64, BtLearnError> {
        let should_evaluate = match self.cache.find(individual) {
            None => true,
            Some(values) => match rerun {
                RerunPolicy::Never => false,
                RerunPolicy::Always => true,
                RerunPolicy::Probabilistic => {
                    self.rng.gen::<f64>() < rerun_probability(values.len())
                }
            },
        };

        if should_evaluate {
            let evaluation = self.evaluator.evaluate(individual)?;
            self.cache.insert(individual, evaluation.fitness);
            if evaluation.completed && self.completed.is_none() {
                self.completed = Some(individual.clone());
            }
        }

        let values = self.cache.find(individual).ok_or_else(|| {
            BtLearnError::Evaluation("fitness sample missing after insert".to_string())
        })?;
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Draws random genotypes until the population is filled, spending up to
    /// the attempt budget per slot on finding a not-yet-present individual.
    /// Once a slot's budget is exhausted a duplicate is tolerated.
    fn create_population(&mut self) -> Result<Vec<Genotype>, BtLearnError> {
        let mut population: Vec<Genotype> = Vec::with_capacity(self.config.n_population);

        for _ in 0..self.config.n_population {
            let mut duplicate: Option<Genotype> = None;
            let mut accepted = false;

            for _ in 0..MAX_ATTEMPTS {
                let candidate = self
                    .grammar
                    .random_genotype(&mut self.rng, self.config.ind_start_length);
                if candidate.is_empty() {
                    continue;
                }
                if !population.contains(&candidate) {
                    population.push(candidate);
                    accepted = true;
                    break;
                }
                duplicate = Some(candidate);
            }

            if !accepted {
                match duplicate {
                    Some(candidate) => {
                        log::warn!("population initialization exhausted, keeping a duplicate");
                        population.push(candidate);
                    }
                    None => {
                        log::warn!("population initialization produced no valid genotype");
                    }
                }
            }
        }

        if population.is_empty() {
            return Err(BtLearnError::Configuration(
                "Grammar produced no valid genotype during initialization".to_string(),
            ));
        }

        Ok(population)
    }

    fn crossover_parent_selection(&mut self, population: &[Genotype], fitness: &[f64]) -> Vec<usize> {
        let n_parents = self.config.n_crossover_parents();
        if n_parents == 0 {
            return Vec::new();
        }
        let candidates: Vec<usize> = (0..population.len()).collect();
        select(
            &candidates,
            &fitness[..population.len()],
            n_parents.min(candidates.len()),
            self.config.parent_selection,
            &mut self.rng,
        )
    }

    /// Generates offspring by subtree crossover. Each accepted pair retires
    /// both parents; pairings that keep failing are abandoned once the
    /// attempt budget runs out, optionally back-filled by mutation.
    fn crossover(
        &mut self,
        population: &[Genotype],
        parents: &[usize],
    ) -> Result<Vec<Genotype>, BtLearnError> {
        if parents.len() % 2 != 0 {
            return Err(BtLearnError::Configuration(
                "Number of parents for crossover must be an even number".to_string(),
            ));
        }

        let mut offspring = Vec::new();

        for _ in 0..self.config.n_offspring_crossover {
            let mut unused: Vec<usize> = parents.to_vec();
            let mut attempts = 0;

            while unused.len() >= 2 && attempts < MAX_ATTEMPTS {
                let first = self.rng.gen_range(0..unused.len());
                let mut second = self.rng.gen_range(0..unused.len());
                while second == first {
                    second = self.rng.gen_range(0..unused.len());
                }

                let (child1, child2) = crossover_genome(
                    &self.grammar,
                    &population[unused[first]],
                    &population[unused[second]],
                    &mut self.rng,
                )?;

                let fresh = self.config.allow_identical
                    || (!population.contains(&child1) && !population.contains(&child2));

                if !child1.is_empty() && !child2.is_empty() && fresh {
                    offspring.push(child1);
                    offspring.push(child2);
                    let (high, low) = if first > second {
                        (first, second)
                    } else {
                        (second, first)
                    };
                    unused.remove(high);
                    unused.remove(low);
                    attempts = 0;
                } else {
                    attempts += 1;
                }
            }

            if attempts == MAX_ATTEMPTS
                && !unused.is_empty()
                && self.config.n_offspring_mutation <= 1
                && self.config.n_offspring_crossover <= 1
            {
                // can't find enough good crossovers, fill up with mutants
                log::warn!(
                    "crossover exhausted, back-filling {} leftover parents via mutation",
                    unused.len()
                );
                let filled = self.mutation(population, &unused)?;
                offspring.extend(filled);
            }
        }

        Ok(offspring)
    }

    /// Selects mutation parents over the remaining or full population,
    /// optionally including crossover offspring. Returned indices point into
    /// the combined pool `population ++ crossover offspring`, which is also
    /// how `fitness` is laid out at this stage.
    fn mutation_parent_selection(
        &mut self,
        population: &[Genotype],
        fitness: &[f64],
        co_parents: &[usize],
        n_co_offspring: usize,
    ) -> Vec<usize> {
        let n_parents = self.config.n_mutation_parents();
        if n_parents == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<usize> = if self.config.mutate_co_parents {
            (0..population.len()).collect()
        } else {
            let excluded: HashSet<usize> = co_parents.iter().copied().collect();
            (0..population.len()).filter(|i| !excluded.contains(i)).collect()
        };
        if self.config.mutate_co_offspring {
            candidates.extend(population.len()..population.len() + n_co_offspring);
        }

        if candidates.is_empty() {
            return Vec::new();
        }

        let candidate_fitness: Vec<f64> = candidates.iter().map(|&i| fitness[i]).collect();
        select(
            &candidates,
            &candidate_fitness,
            n_parents.min(candidates.len()),
            self.config.parent_selection,
            &mut self.rng,
        )
    }

    /// Generates offspring by mutating a single gene per attempt.
    fn mutation(
        &mut self,
        population: &[Genotype],
        parents: &[usize],
    ) -> Result<Vec<Genotype>, BtLearnError> {
        let mut mutated = Vec::new();

        for &parent in parents {
            for _ in 0..self.config.n_offspring_mutation {
                let mut accepted = false;
                for _ in 0..MAX_ATTEMPTS {
                    let candidate = mutate_gene(
                        &self.grammar,
                        &population[parent],
                        self.config.mutation_p_add,
                        self.config.mutation_p_delete,
                        &mut self.rng,
                    )?;
                    if candidate.is_empty() {
                        continue;
                    }
                    if self.config.allow_identical || !population.contains(&candidate) {
                        mutated.push(candidate);
                        accepted = true;
                        break;
                    }
                }
                if !accepted {
                    log::debug!("mutation exhausted for parent {}", parent);
                }
            }
        }

        Ok(mutated)
    }

    /// Survivors for the next generation: elites of the old population
    /// become selectable, offspring join them, top elites survive
    /// unconditionally, and the survivor policy fills the remaining slots.
    fn survivor_selection(
        &mut self,
        population: &[Genotype],
        fitness: &[f64],
        offspring: &[Genotype],
    ) -> (Vec<Genotype>, Vec<f64>) {
        let mut selectable: Vec<Genotype> = Vec::new();
        let mut selectable_fitness: Vec<f64> = Vec::new();

        let n_parents = self.config.n_surviving_parents();
        if n_parents > 0 {
            let candidates: Vec<usize> = (0..population.len()).collect();
            let parents = elite_selection(&candidates, &fitness[..population.len()], n_parents);
            for i in parents {
                selectable.push(population[i].clone());
                selectable_fitness.push(fitness[i]);
            }
        }

        selectable.extend(offspring.iter().cloned());
        selectable_fitness.extend_from_slice(&fitness[population.len()..]);

        let mut survivors: Vec<Genotype> = Vec::new();
        let mut survivor_fitness: Vec<f64> = Vec::new();

        let n_elites = self.config.n_elites();
        if n_elites > 0 {
            let candidates: Vec<usize> = (0..selectable.len()).collect();
            let mut elites = elite_selection(&candidates, &selectable_fitness, n_elites);
            elites.sort_unstable_by(|a, b| b.cmp(a));
            for i in elites {
                survivors.push(selectable.remove(i));
                survivor_fitness.push(selectable_fitness.remove(i));
            }
        }

        let n_to_select = self
            .config
            .n_population
            .saturating_sub(survivors.len())
            .min(selectable.len());
        if n_to_select > 0 {
            let candidates: Vec<usize> = (0..selectable.len()).collect();
            let selected = select(
                &candidates,
                &selectable_fitness,
                n_to_select,
                self.config.survivor_selection,
                &mut self.rng,
            );
            for i in selected {
                survivors.push(selectable[i].clone());
                survivor_fitness.push(selectable_fitness[i]);
            }
        }

        (survivors, survivor_fitness)
    }

    fn update_hall_of_fame(&mut self, population: &[Genotype], fitness: &[f64]) {
        for (individual, &value) in population.iter().zip(fitness) {
            self.hall_of_fame.try_add(individual, value);
        }
    }
}

/// Probability of running another episode for a genotype that already has
/// `n_runs` recorded samples.
pub fn rerun_probability(n_runs: usize) -> f64 {
    if n_runs == 0 {
        1.0
    } else {
        1.0 / (n_runs * n_runs) as f64
    }
}

fn max_fitness(fitness: &[f64]) -> f64 {
    fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn best_index(fitness: &[f64]) -> usize {
    let mut best = 0;
    for (i, value) in fitness.iter().enumerate() {
        if *value > fitness[best] {
            best = i;
        }
    }
    best
}
