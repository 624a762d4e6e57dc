//! End-to-end run of the evolutionary driver against a deterministic toy
//! evaluator, including the hotstart path.

use btlearn::config::{GpConfig, GrammarConfig, RerunPolicy, SelectionMethod};
use btlearn::engines::evaluation::{Evaluation, FitnessEvaluator};
use btlearn::engines::generation::genome::Genotype;
use btlearn::engines::generation::{EvolutionEngine, Grammar, NoProgress, ProgressCallback};
use btlearn::error::BtLearnError;

fn test_grammar() -> Grammar {
    Grammar::new(&GrammarConfig {
        fallback_nodes: vec!["f(".to_string()],
        sequence_nodes: vec!["s(".to_string()],
        control_nodes: vec![],
        condition_nodes: vec!["battery ok?".to_string(), "at goal?".to_string()],
        action_nodes: vec![
            "move!".to_string(),
            "charge!".to_string(),
            "dock!".to_string(),
        ],
        atomic_fallback_nodes: vec![],
        atomic_sequence_nodes: vec![],
        up_node: vec![")".to_string()],
    })
    .expect("test grammar is valid")
}

/// Deterministic evaluator rewarding trees that move before docking and
/// penalizing bloat. A compact mover-then-docker completes the task.
struct PatrolEvaluator {
    episodes: usize,
}

impl FitnessEvaluator for PatrolEvaluator {
    fn evaluate(&mut self, genotype: &Genotype) -> Result<Evaluation, BtLearnError> {
        self.episodes += 1;

        let move_at = genotype.iter().position(|t| t == "move!");
        let dock_at = genotype.iter().position(|t| t == "dock!");
        let ordered = matches!((move_at, dock_at), (Some(m), Some(d)) if m < d);

        let mut fitness = -(genotype.len() as f64);
        if ordered {
            fitness += 20.0;
        } else if move_at.is_some() {
            fitness += 5.0;
        }

        Ok(Evaluation {
            fitness,
            completed: ordered && genotype.len() <= 6,
        })
    }
}

fn test_config(dir: &std::path::Path, name: &str) -> GpConfig {
    GpConfig {
        ind_start_length: 4,
        n_population: 8,
        n_generations: 5,
        f_crossover: 0.5,
        f_mutation: 0.5,
        parent_selection: SelectionMethod::Tournament,
        survivor_selection: SelectionMethod::Tournament,
        rerun_fitness: RerunPolicy::Never,
        log_dir: dir.to_string_lossy().into_owned(),
        log_name: name.to_string(),
        render_best: false,
        seed: Some(42),
        ..GpConfig::default()
    }
}

struct CountingCallback {
    generations: usize,
}

impl ProgressCallback for CountingCallback {
    fn on_generation_complete(&mut self, _generation: usize, _best: f64, _episodes: usize) {
        self.generations += 1;
    }
}

#[test]
fn test_full_run_reaches_final_generation() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "full_run");
    let mut engine =
        EvolutionEngine::new(config, test_grammar(), PatrolEvaluator { episodes: 0 }).unwrap();

    let mut callback = CountingCallback { generations: 0 };
    let result = engine.run(&mut callback).unwrap();

    assert_eq!(callback.generations, 5);
    assert_eq!(result.population.len(), 8);
    assert_eq!(result.fitness.len(), 8);
    assert_eq!(result.best_fitness.len(), 5);
    assert_eq!(result.n_episodes.len(), 5);
    assert!(result.n_episodes.windows(2).all(|w| w[0] <= w[1]));

    // deterministic fitness and surviving elites keep the curve monotone
    assert!(result.best_fitness.windows(2).all(|w| w[0] <= w[1]));

    // the winner is the highest-fitness survivor
    let best = result.fitness.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let grammar = test_grammar();
    assert!(grammar.validate(&result.best_individual));
    assert_eq!(
        result.fitness[result
            .population
            .iter()
            .position(|g| *g == result.best_individual)
            .unwrap()],
        best
    );
}

#[test]
fn test_run_writes_logs_and_cache_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "artifacts");
    let mut engine =
        EvolutionEngine::new(config, test_grammar(), PatrolEvaluator { episodes: 0 }).unwrap();
    engine.run(&mut NoProgress).unwrap();

    let folder = dir.path().join("log_artifacts");
    for artifact in [
        "fitness_log.txt",
        "population_log.txt",
        "best_individual.txt",
        "best_fitness_log.json",
        "n_episodes_log.json",
        "settings.toml",
        "cache_log.jsonl",
    ] {
        assert!(folder.join(artifact).exists(), "missing {}", artifact);
    }

    let fitness_log = std::fs::read_to_string(folder.join("fitness_log.txt")).unwrap();
    assert_eq!(fitness_log.lines().count(), 5);
}

#[test]
fn test_hotstart_reuses_cache_and_population() {
    let dir = tempfile::tempdir().unwrap();

    let first = test_config(dir.path(), "hotstart");
    let mut engine =
        EvolutionEngine::new(first, test_grammar(), PatrolEvaluator { episodes: 0 }).unwrap();
    let result = engine.run(&mut NoProgress).unwrap();
    let episodes_first = *result.n_episodes.last().unwrap();

    let second = test_config(dir.path(), "hotstart");
    let mut engine = EvolutionEngine::new(second, test_grammar(), PatrolEvaluator { episodes: 0 })
        .unwrap()
        .with_hotstart(result.population.clone());
    let resumed = engine.run(&mut NoProgress).unwrap();

    assert_eq!(resumed.population.len(), 8);
    // the reloaded cache already covers the carried population, so the
    // resumed run starts with at least as many recorded samples
    assert!(*resumed.n_episodes.first().unwrap() >= episodes_first);
}

#[test]
fn test_baseline_is_always_available() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "baseline");
    let baseline: Genotype = ["s(", "move!", "dock!", ")"]
        .iter()
        .map(|t| t.to_string())
        .collect();

    let mut engine =
        EvolutionEngine::new(config, test_grammar(), PatrolEvaluator { episodes: 0 })
            .unwrap()
            .with_baseline(baseline.clone());
    let result = engine.run(&mut NoProgress).unwrap();

    // the baseline completes the task on its first evaluation
    assert_eq!(result.completed, Some(baseline));
    // and nothing can beat its fitness class by much given the length penalty
    assert!(*result.best_fitness.last().unwrap() >= 16.0);
}

#[test]
fn test_elitism_survivor_selection_round() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), "elitism");
    config.parent_selection = SelectionMethod::Rank;
    config.survivor_selection = SelectionMethod::Elitism;
    config.f_elites = 0.25;

    let mut engine =
        EvolutionEngine::new(config, test_grammar(), PatrolEvaluator { episodes: 0 }).unwrap();
    let result = engine.run(&mut NoProgress).unwrap();

    assert_eq!(result.population.len(), 8);
    assert!(result.best_fitness.windows(2).all(|w| w[0] <= w[1]));
}
