//! Append-only run logs and end-of-run snapshots.
//!
//! Every run owns a folder `<log_dir>/log_<name>/` holding:
//! - `fitness_log.txt`: one line per generation with all fitness values
//! - `population_log.txt`: one block per generation with every genotype
//! - `best_individual.txt`: the winning genotype
//! - `best_fitness_log.json`: best fitness per generation
//! - `n_episodes_log.json`: cumulative evaluation episodes per generation
//! - `settings.toml`: the parameters of the run, stamped with its start time
//! - `cache_log.jsonl`: the fitness cache export, reloadable for hotstarts

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::GpConfig;
use crate::engines::generation::genome::{format_genotype, Genotype};
use crate::error::BtLearnError;

pub fn get_log_folder(log_dir: &Path, log_name: &str) -> PathBuf {
    log_dir.join(format!("log_{}", log_name))
}

pub fn cache_path(log_dir: &Path, log_name: &str) -> PathBuf {
    get_log_folder(log_dir, log_name).join("cache_log.jsonl")
}

/// Removes previous logs of the same name and recreates the folder with
/// empty fitness and population logs.
pub fn clear_logs(log_dir: &Path, log_name: &str) -> Result<(), BtLearnError> {
    let folder = get_log_folder(log_dir, log_name);
    if folder.exists() {
        fs::remove_dir_all(&folder)?;
    }
    fs::create_dir_all(&folder)?;
    fs::File::create(folder.join("fitness_log.txt"))?;
    fs::File::create(folder.join("population_log.txt"))?;
    Ok(())
}

fn append(path: PathBuf, contents: &str) -> Result<(), BtLearnError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", contents)?;
    Ok(())
}

/// Appends the fitness of all individuals of one generation.
pub fn log_fitness(log_dir: &Path, log_name: &str, fitness: &[f64]) -> Result<(), BtLearnError> {
    let line = fitness
        .iter()
        .map(|f| format!("{:.6}", f))
        .collect::<Vec<_>>()
        .join(" ");
    append(get_log_folder(log_dir, log_name).join("fitness_log.txt"), &line)
}

/// Appends the full population of one generation.
pub fn log_population(
    log_dir: &Path,
    log_name: &str,
    generation: usize,
    population: &[Genotype],
) -> Result<(), BtLearnError> {
    let mut block = format!("generation {}", generation);
    for individual in population {
        block.push('\n');
        block.push_str(&format_genotype(individual));
    }
    append(
        get_log_folder(log_dir, log_name).join("population_log.txt"),
        &block,
    )
}

pub fn log_best_individual(
    log_dir: &Path,
    log_name: &str,
    individual: &Genotype,
) -> Result<(), BtLearnError> {
    fs::write(
        get_log_folder(log_dir, log_name).join("best_individual.txt"),
        format!("{}\n", format_genotype(individual)),
    )?;
    Ok(())
}

pub fn log_best_fitness(
    log_dir: &Path,
    log_name: &str,
    best_fitness: &[f64],
) -> Result<(), BtLearnError> {
    let contents = serde_json::to_string(best_fitness)?;
    fs::write(
        get_log_folder(log_dir, log_name).join("best_fitness_log.json"),
        contents,
    )?;
    Ok(())
}

pub fn log_n_episodes(
    log_dir: &Path,
    log_name: &str,
    n_episodes: &[usize],
) -> Result<(), BtLearnError> {
    let contents = serde_json::to_string(n_episodes)?;
    fs::write(
        get_log_folder(log_dir, log_name).join("n_episodes_log.json"),
        contents,
    )?;
    Ok(())
}

/// Writes the parameters used for the run.
pub fn log_settings(log_dir: &Path, log_name: &str, config: &GpConfig) -> Result<(), BtLearnError> {
    let settings = toml::to_string_pretty(config)
        .map_err(|e| BtLearnError::Configuration(format!("Failed to serialize settings: {}", e)))?;
    let contents = format!("# run started {}\n{}", Local::now().to_rfc3339(), settings);
    fs::write(get_log_folder(log_dir, log_name).join("settings.toml"), contents)?;
    Ok(())
}
