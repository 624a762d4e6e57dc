use std::collections::HashSet;

use crate::engines::generation::genome::{format_genotype, Genotype};

#[derive(Clone, Debug)]
pub struct EliteIndividual {
    pub genotype: Genotype,
    pub fitness: f64,
    /// Joined token sequence, used for deduplication.
    pub signature: String,
}

/// Deduplicated archive of the best individuals seen across all generations.
pub struct HallOfFame {
    individuals: Vec<EliteIndividual>,
    max_size: usize,
    seen_signatures: HashSet<String>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            individuals: Vec::new(),
            max_size,
            seen_signatures: HashSet::new(),
        }
    }

    /// Attempt to add an individual. Duplicates are rejected.
    pub fn try_add(&mut self, genotype: &Genotype, fitness: f64) -> bool {
        let signature = format_genotype(genotype);
        if self.seen_signatures.contains(&signature) {
            return false;
        }

        self.seen_signatures.insert(signature.clone());
        self.individuals.push(EliteIndividual {
            genotype: genotype.clone(),
            fitness,
            signature,
        });
        self.sort_and_trim();
        true
    }

    fn sort_and_trim(&mut self) {
        self.individuals.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        while self.individuals.len() > self.max_size {
            if let Some(removed) = self.individuals.pop() {
                self.seen_signatures.remove(&removed.signature);
            }
        }
    }

    pub fn best(&self) -> Option<&EliteIndividual> {
        self.individuals.first()
    }

    pub fn get_all(&self) -> &[EliteIndividual] {
        &self.individuals
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }
}
