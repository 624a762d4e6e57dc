//! Selection policies for parents and survivors.
//!
//! All functions select from `candidates`, where `fitness[i]` belongs to
//! `candidates[i]`, and return the selected candidate values.

use std::cmp::Ordering;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::SelectionMethod;

pub fn select<R: Rng>(
    candidates: &[usize],
    fitness: &[f64],
    n_selected: usize,
    method: SelectionMethod,
    rng: &mut R,
) -> Vec<usize> {
    match method {
        SelectionMethod::Elitism => elite_selection(candidates, fitness, n_selected),
        SelectionMethod::Tournament => tournament_selection(candidates, fitness, n_selected, rng),
        SelectionMethod::Rank => rank_selection(candidates, fitness, n_selected, rng),
        SelectionMethod::Random => {
            let mut pool = candidates.to_vec();
            pool.shuffle(rng);
            pool.truncate(n_selected);
            pool
        }
        SelectionMethod::All => candidates.to_vec(),
    }
}

/// Top `n_elites` candidates by fitness.
pub fn elite_selection(candidates: &[usize], fitness: &[f64], n_elites: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| fitness[b].partial_cmp(&fitness[a]).unwrap_or(Ordering::Equal));
    order.into_iter().take(n_elites).map(|i| candidates[i]).collect()
}

/// Single-elimination bracket. The bracket is padded to the next power-of-two
/// multiple of `n_winners` with negative-infinity byes; pairwise playoffs
/// keep the higher fitness until `n_winners` entries remain. Byes lose their
/// first playoff against any real candidate and never reach the winner list.
pub fn tournament_selection<R: Rng>(
    candidates: &[usize],
    fitness: &[f64],
    n_winners: usize,
    rng: &mut R,
) -> Vec<usize> {
    if n_winners == 0 || candidates.is_empty() {
        return Vec::new();
    }
    if n_winners >= candidates.len() {
        return candidates.to_vec();
    }

    let mut tournament_size = n_winners;
    while tournament_size < candidates.len() {
        tournament_size *= 2;
    }

    // None marks a bye
    let mut bracket: Vec<(f64, Option<usize>)> = candidates
        .iter()
        .zip(fitness)
        .map(|(&c, &f)| (f, Some(c)))
        .collect();
    bracket.shuffle(rng);

    for i in 0..(tournament_size - candidates.len()) {
        // spread byes out so two of them never meet in the first round
        bracket.insert(i * 2, (f64::NEG_INFINITY, None));
    }

    while bracket.len() > n_winners {
        let playoffs = bracket.len() / 2;
        let mut i = 0;
        for _ in 0..playoffs {
            if bracket[i].0 < bracket[i + 1].0 {
                bracket.remove(i);
            } else {
                bracket.remove(i + 1);
            }
            i += 1;
        }
    }

    bracket.into_iter().filter_map(|(_, c)| c).collect()
}

/// Rank-proportional selection without replacement. Weights fall linearly
/// with rank from `2/(n+1)` for the best candidate down to `2/(n(n+1))` for
/// the worst, summing to one.
pub fn rank_selection<R: Rng>(
    candidates: &[usize],
    fitness: &[f64],
    n_selected: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n_ranks = candidates.len();
    if n_ranks == 0 || n_selected == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n_ranks).collect();
    order.sort_by(|&a, &b| fitness[b].partial_cmp(&fitness[a]).unwrap_or(Ordering::Equal));

    let high = 2.0 / (n_ranks as f64 + 1.0);
    let low = 2.0 / (n_ranks as f64 * (n_ranks as f64 + 1.0));
    let step = if n_ranks > 1 {
        (high - low) / (n_ranks - 1) as f64
    } else {
        0.0
    };
    let mut weights: Vec<f64> = (0..n_ranks).map(|rank| high - step * rank as f64).collect();

    let mut remaining = order;
    let mut selected = Vec::with_capacity(n_selected);
    for _ in 0..n_selected.min(n_ranks) {
        let Ok(dist) = WeightedIndex::new(&weights) else {
            break;
        };
        let pick = dist.sample(rng);
        selected.push(candidates[remaining[pick]]);
        remaining.remove(pick);
        weights.remove(pick);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn distinct(selected: &[usize]) -> bool {
        let mut seen = std::collections::HashSet::new();
        selected.iter().all(|&i| seen.insert(i))
    }

    #[test]
    fn test_elite_selection_keeps_the_best() {
        let candidates: Vec<usize> = (0..6).collect();
        let fitness = [0.2, 0.9, 0.1, 0.7, 0.5, 0.3];
        let selected = elite_selection(&candidates, &fitness, 3);
        assert_eq!(selected.len(), 3);
        assert!(distinct(&selected));
        let worst_selected = selected.iter().map(|&i| fitness[i]).fold(f64::INFINITY, f64::min);
        for i in candidates.iter().filter(|i| !selected.contains(i)) {
            assert!(fitness[*i] <= worst_selected);
        }
    }

    #[test]
    fn test_tournament_selection_never_returns_a_bye() {
        let candidates: Vec<usize> = (0..5).collect();
        let fitness = [0.1, 0.9, 0.4, 0.6, 0.2];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let winners = tournament_selection(&candidates, &fitness, 2, &mut rng);
            assert_eq!(winners.len(), 2);
            assert!(distinct(&winners));
            assert!(winners.iter().all(|w| candidates.contains(w)));
        }
    }

    #[test]
    fn test_tournament_selection_prefers_high_fitness() {
        let candidates: Vec<usize> = (0..8).collect();
        let fitness = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let mut wins = 0;
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let winners = tournament_selection(&candidates, &fitness, 1, &mut rng);
            if winners == vec![7] {
                wins += 1;
            }
        }
        // the single strong candidate wins every full bracket
        assert_eq!(wins, 50);
    }

    #[test]
    fn test_rank_selection_samples_without_replacement() {
        let candidates: Vec<usize> = (0..6).collect();
        let fitness = [0.2, 0.9, 0.1, 0.7, 0.5, 0.3];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = rank_selection(&candidates, &fitness, 4, &mut rng);
            assert_eq!(selected.len(), 4);
            assert!(distinct(&selected));
        }
    }

    #[test]
    fn test_random_selection_is_without_replacement() {
        let candidates: Vec<usize> = (0..6).collect();
        let fitness = [0.0; 6];
        let mut rng = StdRng::seed_from_u64(1);
        let selected = select(&candidates, &fitness, 4, SelectionMethod::Random, &mut rng);
        assert_eq!(selected.len(), 4);
        assert!(distinct(&selected));
    }

    #[test]
    fn test_all_selection_is_identity() {
        let candidates: Vec<usize> = (0..4).collect();
        let fitness = [0.0; 4];
        let mut rng = StdRng::seed_from_u64(1);
        let selected = select(&candidates, &fitness, 2, SelectionMethod::All, &mut rng);
        assert_eq!(selected, candidates);
    }
}
