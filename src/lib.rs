//! Genetic programming over behavior trees encoded as flat token sequences.
//!
//! The crate searches for a behavior-tree program maximizing a task-specific
//! fitness signal obtained from an external evaluator. Its core pieces:
//!
//! - [`engines::generation::Grammar`]: the token alphabet and the validity
//!   rules turning a flat sequence into a tree, with index-based navigation
//!   and bracket repair
//! - [`engines::generation::operators`]: structure-preserving mutation and
//!   crossover with bounded retry-until-valid semantics
//! - [`engines::evaluation::FitnessCache`]: memoized fitness samples per
//!   genotype, exportable and reloadable for hotstarts
//! - [`engines::generation::EvolutionEngine`]: the generational driver with
//!   pluggable selection policies
//!
//! The task simulator is consumed through the
//! [`engines::evaluation::FitnessEvaluator`] trait and is not part of this
//! crate.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;

pub use error::{BtLearnError, Result};
