//! Demo runner: evolves a behavior tree for a toy pick-and-place task.
//!
//! The task simulator here is a stand-in for a real one; it parses the
//! genotype into a tree, ticks it against a four-flag world state and scores
//! the episode. Pass a TOML config path to override the built-in grammar and
//! GP parameters:
//!
//! ```text
//! btlearn [config.toml]
//! ```

use std::path::Path;

use anyhow::Context;

use btlearn::config::{AppConfig, ConfigManager, GpConfig, GrammarConfig};
use btlearn::engines::evaluation::{Evaluation, FitnessEvaluator};
use btlearn::engines::generation::genome::{format_genotype, Genotype, Token};
use btlearn::engines::generation::{ConsoleProgressCallback, EvolutionEngine, Grammar};
use btlearn::error::BtLearnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Failure,
    Running,
}

enum Node {
    Fallback(Vec<Node>),
    Sequence(Vec<Node>),
    Condition(Token),
    Action(Token),
}

#[derive(Debug, Default)]
struct WorldState {
    at_pick: bool,
    at_place: bool,
    holding: bool,
    placed: bool,
    steps: usize,
}

impl WorldState {
    fn check(&self, token: &str) -> Status {
        let holds = match token {
            "have cube?" => self.holding,
            "cube placed?" => self.placed,
            "at pick pose?" => self.at_pick,
            "at place pose?" => self.at_place,
            _ => false,
        };
        if holds {
            Status::Success
        } else {
            Status::Failure
        }
    }

    fn apply(&mut self, token: &str) -> Status {
        self.steps += 1;
        match token {
            "go to pick pose!" => {
                self.at_pick = true;
                self.at_place = false;
                Status::Success
            }
            "go to place pose!" => {
                self.at_place = true;
                self.at_pick = false;
                Status::Success
            }
            "pick cube!" => {
                if self.at_pick && !self.holding && !self.placed {
                    self.holding = true;
                    Status::Success
                } else {
                    Status::Failure
                }
            }
            "place cube!" => {
                if self.at_place && self.holding {
                    self.holding = false;
                    self.placed = true;
                    Status::Success
                } else {
                    Status::Failure
                }
            }
            "idle!" => Status::Running,
            _ => Status::Failure,
        }
    }
}

impl Node {
    fn tick(&self, world: &mut WorldState) -> Status {
        match self {
            Node::Fallback(children) => {
                for child in children {
                    match child.tick(world) {
                        Status::Failure => continue,
                        status => return status,
                    }
                }
                Status::Failure
            }
            Node::Sequence(children) => {
                for child in children {
                    match child.tick(world) {
                        Status::Success => continue,
                        status => return status,
                    }
                }
                Status::Success
            }
            Node::Condition(token) => world.check(token),
            Node::Action(token) => world.apply(token),
        }
    }
}

/// Toy simulator implementing the evaluator side of the search.
struct PickAndPlaceEvaluator {
    grammar: Grammar,
    max_ticks: usize,
}

impl PickAndPlaceEvaluator {
    fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            max_ticks: 10,
        }
    }

    fn parse(&self, genotype: &[Token]) -> Result<Node, BtLearnError> {
        let mut cursor = 0;
        let node = self.parse_node(genotype, &mut cursor)?;
        if cursor != genotype.len() {
            return Err(BtLearnError::InvalidGenotype(format!(
                "trailing tokens after position {}",
                cursor
            )));
        }
        Ok(node)
    }

    fn parse_node(&self, genotype: &[Token], cursor: &mut usize) -> Result<Node, BtLearnError> {
        let token = genotype.get(*cursor).ok_or_else(|| {
            BtLearnError::InvalidGenotype("unexpected end of genotype".to_string())
        })?;
        *cursor += 1;

        if self.grammar.is_control(token) {
            let family = token.clone();
            let mut children = Vec::new();
            loop {
                let next = genotype.get(*cursor).ok_or_else(|| {
                    BtLearnError::InvalidGenotype("unclosed control scope".to_string())
                })?;
                if self.grammar.is_up(next) {
                    *cursor += 1;
                    break;
                }
                children.push(self.parse_node(genotype, cursor)?);
            }
            if self.grammar.is_fallback(&family) {
                Ok(Node::Fallback(children))
            } else {
                Ok(Node::Sequence(children))
            }
        } else if self.grammar.is_condition(token) {
            Ok(Node::Condition(token.clone()))
        } else if self.grammar.is_leaf(token) {
            Ok(Node::Action(token.clone()))
        } else {
            Err(BtLearnError::InvalidGenotype(format!(
                "unexpected token '{}'",
                token
            )))
        }
    }
}

impl FitnessEvaluator for PickAndPlaceEvaluator {
    fn evaluate(&mut self, genotype: &Genotype) -> Result<Evaluation, BtLearnError> {
        let tree = self.parse(genotype)?;
        let mut world = WorldState::default();

        for _ in 0..self.max_ticks {
            tree.tick(&mut world);
            if world.placed {
                break;
            }
        }

        let mut cost = world.steps as f64 + 0.5 * self.grammar.length(genotype) as f64;
        if !world.placed {
            cost += 50.0;
        }

        Ok(Evaluation {
            fitness: -cost,
            completed: world.placed,
        })
    }

    fn render(&self, genotype: &Genotype, path: &Path, name: &str) -> Result<(), BtLearnError> {
        std::fs::write(
            path.join(format!("{}.txt", name)),
            format!("{}\n", format_genotype(genotype)),
        )?;
        Ok(())
    }
}

fn demo_config() -> AppConfig {
    AppConfig {
        grammar: GrammarConfig {
            fallback_nodes: vec!["f(".to_string()],
            sequence_nodes: vec!["s(".to_string()],
            control_nodes: vec![],
            condition_nodes: vec![
                "have cube?".to_string(),
                "cube placed?".to_string(),
                "at pick pose?".to_string(),
                "at place pose?".to_string(),
            ],
            action_nodes: vec![
                "go to pick pose!".to_string(),
                "go to place pose!".to_string(),
                "pick cube!".to_string(),
                "place cube!".to_string(),
                "idle!".to_string(),
            ],
            atomic_fallback_nodes: vec![],
            atomic_sequence_nodes: vec![],
            up_node: vec![")".to_string()],
        },
        evolution: GpConfig {
            ind_start_length: 4,
            n_population: 30,
            f_crossover: 0.4,
            f_mutation: 0.6,
            n_offspring_crossover: 2,
            n_offspring_mutation: 4,
            mutation_p_add: 0.5,
            mutation_p_delete: 0.2,
            n_generations: 50,
            log_name: "pick_and_place".to_string(),
            seed: Some(100),
            ..GpConfig::default()
        },
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let manager = ConfigManager::new();
            manager
                .load_from_file(&path)
                .with_context(|| format!("loading config from {}", path))?;
            manager.get()
        }
        None => demo_config(),
    };
    config.validate()?;

    let grammar = Grammar::new(&config.grammar)?;
    let evaluator = PickAndPlaceEvaluator::new(grammar.clone());
    let mut engine = EvolutionEngine::new(config.evolution, grammar, evaluator)?;

    let result = engine.run(&mut ConsoleProgressCallback)?;

    println!();
    println!("Best individual: {}", format_genotype(&result.best_individual));
    println!(
        "Best fitness: {:.4} after {} episodes",
        result.best_fitness.last().copied().unwrap_or(f64::NEG_INFINITY),
        result.n_episodes.last().copied().unwrap_or(0)
    );
    match &result.completed {
        Some(individual) => println!("Task completed by: {}", format_genotype(individual)),
        None => println!("Task was not completed"),
    }

    Ok(())
}
