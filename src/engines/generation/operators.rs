//! Grammar-aware mutation and crossover operators.
//!
//! Every operator edits the flat token sequence in place and leaves bracket
//! repair to [`Grammar::close`], which is always the final step of a mutation
//! attempt. Operators assume their input genotype is valid; a structural
//! error out of one of them means the caller handed in a broken genotype.

use rand::Rng;

use crate::engines::generation::genome::{Genotype, Token};
use crate::engines::generation::grammar::Grammar;
use crate::engines::generation::MAX_ATTEMPTS;
use crate::error::BtLearnError;

/// Substitutes the token at `index`, drawing a random one when `new_node` is
/// `None`. Turning a control into a leaf removes the matching close and
/// collapses the scope. Turning a leaf into a control inserts a matching
/// close plus one filler child of the opposite broad leaf class, so the new
/// scope never consists of a single condition.
pub fn change_node<R: Rng>(
    grammar: &Grammar,
    genotype: &mut Genotype,
    index: usize,
    new_node: Option<Token>,
    rng: &mut R,
) -> Result<(), BtLearnError> {
    let new_node = new_node.unwrap_or_else(|| grammar.random_node(rng));

    if grammar.is_leaf(&new_node) && grammar.is_control(&genotype[index]) {
        let close = grammar.matching_close(genotype, index)?;
        genotype.remove(close);
        genotype[index] = new_node;
    } else if grammar.is_control(&new_node) && grammar.is_leaf(&genotype[index]) {
        let old_node = genotype[index].clone();
        genotype[index] = new_node;
        if grammar.is_behavior(&old_node) {
            genotype.insert(index + 1, grammar.random_leaf(rng));
            genotype.insert(index + 2, old_node);
        } else {
            // a condition must not be the last child
            genotype.insert(index + 1, old_node);
            genotype.insert(index + 2, grammar.random_behavior(rng));
        }
        genotype.insert(index + 3, grammar.up().clone());
    } else {
        genotype[index] = new_node;
    }

    Ok(())
}

/// Inserts a token at `index`, drawing a random one when `new_node` is
/// `None`. Inserting a control that would break fallback/sequence
/// alternation with its parent or prospective children synthesizes an
/// opposing-family wrapper instead of rejecting, then balances closes and
/// adds filler children so every control scope keeps at least two children.
pub fn add_node<R: Rng>(
    grammar: &Grammar,
    genotype: &mut Genotype,
    index: usize,
    new_node: Option<Token>,
    rng: &mut R,
) -> Result<(), BtLearnError> {
    let new_node = new_node.unwrap_or_else(|| grammar.random_node(rng));

    if !grammar.is_control(&new_node) {
        genotype.insert(index, new_node);
        return Ok(());
    }

    if index == 0 {
        // encapsulate the entire tree, with a filler behavior as a sibling
        // so the new root scope has two children
        genotype.insert(0, new_node);
        genotype.push(grammar.random_behavior(rng));
        genotype.push(grammar.up().clone());
        return Ok(());
    }

    let parent_token = grammar.parent(genotype, index).map(|p| genotype[p].clone());

    let mut wrapper: Option<(Token, Token)> = None;
    if let Some(parent) = &parent_token {
        if grammar.is_fallback(&new_node) && grammar.is_fallback(parent) {
            wrapper = Some((grammar.random_sequence(rng), new_node.clone()));
        } else if grammar.is_sequence(&new_node) && grammar.is_sequence(parent) {
            wrapper = Some((grammar.random_fallback(rng), new_node.clone()));
        }
    }
    if wrapper.is_none() {
        let child_scopes = grammar.child_control_scopes(genotype, index);
        if grammar.is_fallback(&new_node)
            && child_scopes.iter().any(|&c| grammar.is_fallback(&genotype[c]))
        {
            wrapper = Some((new_node.clone(), grammar.random_sequence(rng)));
        } else if grammar.is_sequence(&new_node)
            && child_scopes.iter().any(|&c| grammar.is_sequence(&genotype[c]))
        {
            wrapper = Some((new_node.clone(), grammar.random_fallback(rng)));
        }
    }

    if let Some((upper, lower)) = wrapper {
        // alternation conflict, add two nested control scopes
        genotype.insert(index, upper);
        if rng.gen::<f64>() < 0.5 {
            // lower scope on the right, new leaf on the left
            genotype.insert(index + 1, grammar.random_leaf(rng));
            genotype.insert(index + 2, lower);
            let close = grammar.matching_close(genotype, index + 2)?;
            genotype.insert(close, grammar.up().clone());
            genotype.insert(close + 1, grammar.up().clone());
        } else {
            // lower scope on the left, new behavior on the right
            genotype.insert(index + 1, lower);
            let close = grammar.matching_close(genotype, index + 1)?;
            genotype.insert(close, grammar.up().clone());
            genotype.insert(close + 1, grammar.random_behavior(rng));
            genotype.insert(close + 2, grammar.up().clone());
        }
    } else {
        // no alternation conflict, the remaining siblings become children
        genotype.insert(index, new_node);
        let close = grammar.matching_close(genotype, index)?;
        if close == index + 1 {
            genotype.insert(index + 1, grammar.random_leaf(rng));
            genotype.insert(index + 2, grammar.random_behavior(rng));
            genotype.insert(index + 3, grammar.up().clone());
        } else {
            genotype.insert(close, grammar.up().clone());
        }
    }

    if grammar.is_control(&genotype[index - 1]) {
        // the new control took all children from its parent; give the
        // parent one more so it keeps at least two
        if rng.gen::<f64>() < 0.5 {
            genotype.insert(index, grammar.random_leaf(rng));
        } else {
            let close = grammar.matching_close(genotype, index)?;
            genotype.insert(close + 1, grammar.random_behavior(rng));
        }
    }

    Ok(())
}

/// Deletes the node at `index`. Deleting a leaf collapses any immediately
/// enclosing `(control, leaf, close)` triad outward while the pattern holds.
/// Deleting a control with `delete_children` first deletes, non-recursively,
/// any fallback/sequence children at the next level so alternation survives
/// the splice, then removes the control and its matching close.
pub fn delete_node(
    grammar: &Grammar,
    genotype: &mut Genotype,
    mut index: usize,
    delete_children: bool,
) -> Result<(), BtLearnError> {
    if grammar.is_leaf(&genotype[index]) {
        while index > 0
            && index + 1 < genotype.len()
            && grammar.is_control(&genotype[index - 1])
            && grammar.is_up(&genotype[index + 1])
        {
            genotype.remove(index - 1);
            // the close shifted onto index after the first removal
            genotype.remove(index);
            index -= 1;
        }
    } else if grammar.is_control(&genotype[index]) {
        if delete_children {
            let child_scopes = grammar.child_control_scopes(genotype, index + 1);
            for &child in child_scopes.iter().rev() {
                delete_node(grammar, genotype, child, false)?;
            }
        }
        let close = grammar.matching_close(genotype, index)?;
        genotype.remove(close);
    }

    genotype.remove(index);
    Ok(())
}

/// Mutates a single gene: with probability `p_delete` deletes at a random
/// index, with probability `p_add` inserts, otherwise substitutes; repairs
/// via `close` and retries with a fresh index until the result is valid and
/// differs from the input. Returns the empty sentinel after exhausting the
/// attempt budget.
pub fn mutate_gene<R: Rng>(
    grammar: &Grammar,
    genotype: &Genotype,
    p_add: f64,
    p_delete: f64,
    rng: &mut R,
) -> Result<Genotype, BtLearnError> {
    if p_add < 0.0 || p_delete < 0.0 {
        return Err(BtLearnError::Configuration(
            "Mutation probabilities must not be negative".to_string(),
        ));
    }
    if p_add + p_delete > 1.0 {
        return Err(BtLearnError::Configuration(
            "Sum of the mutation probabilities must not exceed 1".to_string(),
        ));
    }

    for _ in 0..MAX_ATTEMPTS {
        let mut mutated = genotype.clone();
        let index = rng.gen_range(0..genotype.len());
        let roll = rng.gen::<f64>();

        if roll < p_delete {
            delete_node(grammar, &mut mutated, index, true)?;
        } else if roll < p_delete + p_add {
            add_node(grammar, &mut mutated, index, None, rng)?;
        } else {
            change_node(grammar, &mut mutated, index, None, rng)?;
        }

        grammar.close(&mut mutated);

        if grammar.validate(&mutated) && mutated != *genotype {
            return Ok(mutated);
        }
    }

    log::debug!("gene mutation exhausted after {} attempts", MAX_ATTEMPTS);
    Ok(Genotype::new())
}

/// Crossover between two valid genotypes at random subtree roots. Both
/// offspring must validate for a swap to be accepted; after exhausting the
/// attempt budget an empty pair is returned.
pub fn crossover_genome<R: Rng>(
    grammar: &Grammar,
    genotype1: &Genotype,
    genotype2: &Genotype,
    rng: &mut R,
) -> Result<(Genotype, Genotype), BtLearnError> {
    if !grammar.validate(genotype1) || !grammar.validate(genotype2) {
        return Err(BtLearnError::InvalidGenotype(
            "crossover requires two valid genotypes".to_string(),
        ));
    }

    for _ in 0..MAX_ATTEMPTS {
        let mut offspring1 = genotype1.clone();
        let mut offspring2 = genotype2.clone();
        let index1 = random_subtree_root(grammar, genotype1, rng);
        let index2 = random_subtree_root(grammar, genotype2, rng);

        swap_subtrees(grammar, &mut offspring1, &mut offspring2, index1, index2)?;

        if grammar.validate(&offspring1) && grammar.validate(&offspring2) {
            return Ok((offspring1, offspring2));
        }
    }

    log::debug!("crossover exhausted after {} attempts", MAX_ATTEMPTS);
    Ok((Genotype::new(), Genotype::new()))
}

/// Swaps the subtrees rooted at the given indices between two genotypes.
/// Close-marker indices root no subtree and leave both genotypes untouched.
pub fn swap_subtrees(
    grammar: &Grammar,
    genotype1: &mut Genotype,
    genotype2: &mut Genotype,
    index1: usize,
    index2: usize,
) -> Result<(), BtLearnError> {
    let subtree1 = grammar.subtree(genotype1, index1)?;
    let subtree2 = grammar.subtree(genotype2, index2)?;

    if subtree1.is_empty() || subtree2.is_empty() {
        return Ok(());
    }

    genotype1.splice(index1..index1 + subtree1.len(), subtree2.iter().cloned());
    genotype2.splice(index2..index2 + subtree2.len(), subtree1.into_iter());

    Ok(())
}

/// Index 0 only when the whole genotype is a single node; otherwise a random
/// interior index that roots a subtree.
fn random_subtree_root<R: Rng>(grammar: &Grammar, genotype: &Genotype, rng: &mut R) -> usize {
    if genotype.len() == 1 {
        return 0;
    }
    loop {
        let index = rng.gen_range(1..genotype.len());
        if grammar.is_subtree_root(genotype, index) {
            return index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::grammar::test_support::{genotype, grammar};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_change_control_to_leaf_collapses_scope() {
        let grammar = grammar();
        let mut g = genotype(&["f(", "c1", "s(", "a1", "a2", ")", ")"]);
        change_node(
            &grammar,
            &mut g,
            2,
            Some("a3".to_string()),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert_eq!(g, genotype(&["f(", "c1", "a3", "a1", "a2", ")"]));
    }

    #[test]
    fn test_change_behavior_leaf_to_control_wraps() {
        let grammar = grammar();
        let mut g = genotype(&["f(", "c1", "a1", ")"]);
        let mut rng = StdRng::seed_from_u64(1);
        change_node(&grammar, &mut g, 2, Some("s(".to_string()), &mut rng).unwrap();
        assert_eq!(g.len(), 7);
        assert_eq!(g[2], "s(");
        assert!(grammar.is_leaf(&g[3]));
        // the old behavior stays as the last child of the new scope
        assert_eq!(g[4], "a1");
        assert_eq!(g[5], ")");
    }

    #[test]
    fn test_change_condition_leaf_to_control_keeps_behavior_last() {
        let grammar = grammar();
        let mut g = genotype(&["s(", "c1", "a1", ")"]);
        let mut rng = StdRng::seed_from_u64(2);
        change_node(&grammar, &mut g, 1, Some("f(".to_string()), &mut rng).unwrap();
        assert_eq!(g[1], "f(");
        assert_eq!(g[2], "c1");
        assert!(grammar.is_behavior(&g[3]));
        assert_eq!(g[4], ")");
    }

    #[test]
    fn test_add_then_delete_leaf_restores_original() {
        let grammar = grammar();
        let original = genotype(&["s(", "c1", "a1", ")"]);
        let mut g = original.clone();
        let mut rng = StdRng::seed_from_u64(3);
        add_node(&grammar, &mut g, 2, Some("a2".to_string()), &mut rng).unwrap();
        assert_eq!(g, genotype(&["s(", "c1", "a2", "a1", ")"]));
        delete_node(&grammar, &mut g, 2, true).unwrap();
        assert_eq!(g, original);
    }

    #[test]
    fn test_add_control_at_root_wraps_whole_tree() {
        let grammar = grammar();
        let mut g = genotype(&["a1"]);
        let mut rng = StdRng::seed_from_u64(4);
        add_node(&grammar, &mut g, 0, Some("s(".to_string()), &mut rng).unwrap();
        assert_eq!(g.len(), 4);
        assert_eq!(g[0], "s(");
        assert_eq!(g[1], "a1");
        assert!(grammar.is_behavior(&g[2]));
        assert_eq!(g[3], ")");
    }

    #[test]
    fn test_add_conflicting_control_synthesizes_wrapper() {
        let grammar = grammar();
        let mut rng = StdRng::seed_from_u64(5);
        let mut valid_results = 0;
        for _ in 0..20 {
            let mut g = genotype(&["f(", "c1", "a1", ")"]);
            add_node(&grammar, &mut g, 1, Some("f(".to_string()), &mut rng).unwrap();
            grammar.close(&mut g);
            // an opposing sequence was interposed between the two fallbacks
            assert!(g.contains(&"s(".to_string()));
            if grammar.validate(&g) {
                valid_results += 1;
            }
        }
        // random filler leaves occasionally break family rules; the mutation
        // loop filters those, but most raw results must already be valid
        assert!(valid_results > 0);
    }

    #[test]
    fn test_delete_leaf_collapses_triad() {
        let grammar = grammar();
        let mut g = genotype(&["s(", "a1", "f(", "a2", ")", ")"]);
        delete_node(&grammar, &mut g, 3, true).unwrap();
        assert_eq!(g, genotype(&["s(", "a1", ")"]));
    }

    #[test]
    fn test_delete_control_splices_children_into_parent() {
        let grammar = grammar();
        let mut g = genotype(&["f(", "c1", "s(", "a1", "a2", ")", ")"]);
        delete_node(&grammar, &mut g, 2, true).unwrap();
        assert_eq!(g, genotype(&["f(", "c1", "a1", "a2", ")"]));
    }

    #[test]
    fn test_delete_control_removes_conflicting_children_first() {
        let grammar = grammar();
        // deleting the sequence leaves its fallback child; that child is
        // deleted first so the surviving grandchildren splice under the root
        let mut g = genotype(&["f(", "c1", "s(", "f(", "a1", "a2", ")", "a3", ")", ")"]);
        delete_node(&grammar, &mut g, 2, true).unwrap();
        grammar.close(&mut g);
        assert!(grammar.validate(&g), "got {:?}", g);
        assert!(!g.contains(&"s(".to_string()));
    }

    #[test]
    fn test_mutate_gene_rejects_bad_probabilities() {
        let grammar = grammar();
        let g = genotype(&["a1"]);
        let mut rng = StdRng::seed_from_u64(6);
        assert!(mutate_gene(&grammar, &g, -0.1, 0.0, &mut rng).is_err());
        assert!(mutate_gene(&grammar, &g, 0.7, 0.5, &mut rng).is_err());
    }

    #[test]
    fn test_mutate_gene_always_add_wraps_single_leaf() {
        let grammar = grammar();
        let g = genotype(&["a1"]);
        let mut rng = StdRng::seed_from_u64(7);
        let mutated = mutate_gene(&grammar, &g, 1.0, 0.0, &mut rng).unwrap();
        assert_eq!(mutated.len(), 4);
        assert!(grammar.is_control(&mutated[0]));
        assert!(mutated.contains(&"a1".to_string()));
        assert!(grammar.validate(&mutated));
    }

    #[test]
    fn test_mutate_gene_returns_valid_and_different() {
        let grammar = grammar();
        let g = genotype(&["f(", "c1", "s(", "a1", "a2", ")", ")"]);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let mutated = mutate_gene(&grammar, &g, 0.4, 0.3, &mut rng).unwrap();
            if mutated.is_empty() {
                continue;
            }
            assert!(grammar.validate(&mutated), "got {:?}", mutated);
            assert_ne!(mutated, g);
        }
    }

    #[test]
    fn test_swap_subtrees_twice_restores_both() {
        let grammar = grammar();
        let original1 = genotype(&["f(", "c1", "s(", "a1", "a2", ")", ")"]);
        let original2 = genotype(&["s(", "c2", "a3", ")"]);
        let mut g1 = original1.clone();
        let mut g2 = original2.clone();

        swap_subtrees(&grammar, &mut g1, &mut g2, 2, 2).unwrap();
        assert_eq!(g1, genotype(&["f(", "c1", "a3", ")"]));
        assert_eq!(g2, genotype(&["s(", "c2", "s(", "a1", "a2", ")", ")"]));

        swap_subtrees(&grammar, &mut g1, &mut g2, 2, 2).unwrap();
        assert_eq!(g1, original1);
        assert_eq!(g2, original2);
    }

    #[test]
    fn test_crossover_rejects_invalid_input() {
        let grammar = grammar();
        let valid = genotype(&["f(", "c1", "a1", ")"]);
        let invalid = genotype(&["c1", "c1"]);
        let mut rng = StdRng::seed_from_u64(9);
        assert!(crossover_genome(&grammar, &valid, &invalid, &mut rng).is_err());
    }

    #[test]
    fn test_crossover_produces_valid_offspring() {
        let grammar = grammar();
        let g1 = genotype(&["f(", "c1", "s(", "a1", "a2", ")", ")"]);
        let g2 = genotype(&["s(", "c2", "a3", ")"]);
        let mut rng = StdRng::seed_from_u64(10);
        for _ in 0..20 {
            let (o1, o2) = crossover_genome(&grammar, &g1, &g2, &mut rng).unwrap();
            assert!(!o1.is_empty() && !o2.is_empty());
            assert!(grammar.validate(&o1));
            assert!(grammar.validate(&o2));
        }
    }
}
