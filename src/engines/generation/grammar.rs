use std::collections::HashSet;

use rand::Rng;

use crate::config::GrammarConfig;
use crate::engines::generation::genome::{Genotype, Token};
use crate::engines::generation::MAX_ATTEMPTS;
use crate::error::BtLearnError;

/// Immutable grammar over the flat token-sequence tree encoding.
///
/// Built once from a validated [`GrammarConfig`] and passed by reference into
/// every encoding, operator and driver call. Category membership is answered
/// from hash sets; the per-category vectors keep configuration order for
/// random draws. All navigation functions are pure index computations over
/// the sequence.
#[derive(Debug, Clone)]
pub struct Grammar {
    fallbacks: Vec<Token>,
    sequences: Vec<Token>,
    controls: Vec<Token>,
    conditions: Vec<Token>,
    actions: Vec<Token>,
    behaviors: Vec<Token>,
    leaves: Vec<Token>,
    ups: Vec<Token>,

    fallback_set: HashSet<Token>,
    sequence_set: HashSet<Token>,
    control_set: HashSet<Token>,
    condition_set: HashSet<Token>,
    action_set: HashSet<Token>,
    atomic_fallback_set: HashSet<Token>,
    atomic_sequence_set: HashSet<Token>,
    behavior_set: HashSet<Token>,
    leaf_set: HashSet<Token>,
    up_set: HashSet<Token>,
    known: HashSet<Token>,
}

impl Grammar {
    pub fn new(config: &GrammarConfig) -> Result<Self, BtLearnError> {
        use crate::config::traits::ConfigSection;
        config.validate()?;

        let mut controls = config.control_nodes.clone();
        controls.extend(config.fallback_nodes.iter().cloned());
        controls.extend(config.sequence_nodes.iter().cloned());

        let mut behaviors = config.action_nodes.clone();
        behaviors.extend(config.atomic_fallback_nodes.iter().cloned());
        behaviors.extend(config.atomic_sequence_nodes.iter().cloned());

        let mut leaves = config.condition_nodes.clone();
        leaves.extend(behaviors.iter().cloned());

        let to_set = |tokens: &[Token]| tokens.iter().cloned().collect::<HashSet<_>>();

        let mut known = to_set(&controls);
        known.extend(leaves.iter().cloned());
        known.extend(config.up_node.iter().cloned());

        Ok(Self {
            fallback_set: to_set(&config.fallback_nodes),
            sequence_set: to_set(&config.sequence_nodes),
            control_set: to_set(&controls),
            condition_set: to_set(&config.condition_nodes),
            action_set: to_set(&config.action_nodes),
            atomic_fallback_set: to_set(&config.atomic_fallback_nodes),
            atomic_sequence_set: to_set(&config.atomic_sequence_nodes),
            behavior_set: to_set(&behaviors),
            leaf_set: to_set(&leaves),
            up_set: to_set(&config.up_node),
            known,
            fallbacks: config.fallback_nodes.clone(),
            sequences: config.sequence_nodes.clone(),
            controls,
            conditions: config.condition_nodes.clone(),
            actions: config.action_nodes.clone(),
            behaviors,
            leaves,
            ups: config.up_node.clone(),
        })
    }

    /// The primary close-marker token.
    pub fn up(&self) -> &Token {
        &self.ups[0]
    }

    pub fn is_control(&self, token: &str) -> bool {
        self.control_set.contains(token)
    }

    pub fn is_fallback(&self, token: &str) -> bool {
        self.fallback_set.contains(token)
    }

    pub fn is_sequence(&self, token: &str) -> bool {
        self.sequence_set.contains(token)
    }

    pub fn is_condition(&self, token: &str) -> bool {
        self.condition_set.contains(token)
    }

    pub fn is_action(&self, token: &str) -> bool {
        self.action_set.contains(token)
    }

    pub fn is_atomic_fallback(&self, token: &str) -> bool {
        self.atomic_fallback_set.contains(token)
    }

    pub fn is_atomic_sequence(&self, token: &str) -> bool {
        self.atomic_sequence_set.contains(token)
    }

    pub fn is_behavior(&self, token: &str) -> bool {
        self.behavior_set.contains(token)
    }

    pub fn is_leaf(&self, token: &str) -> bool {
        self.leaf_set.contains(token)
    }

    pub fn is_up(&self, token: &str) -> bool {
        self.up_set.contains(token)
    }

    pub fn is_known(&self, token: &str) -> bool {
        self.known.contains(token)
    }

    /// Checks whether the genotype is a valid behavior tree.
    /// Checks run roughly in order of likelihood to fail.
    pub fn validate(&self, genotype: &[Token]) -> bool {
        if genotype.is_empty() {
            return false;
        }

        // The first token cannot be a leaf if others follow it
        if !self.is_control(&genotype[0]) && genotype.len() != 1 {
            return false;
        }

        for i in 0..genotype.len() {
            if !self.is_known(&genotype[i]) {
                return false;
            }
            if i + 1 < genotype.len() {
                // close directly after a control opens an empty scope
                if self.is_control(&genotype[i]) && self.is_up(&genotype[i + 1]) {
                    return false;
                }
                // identical condition twice in a row is waste
                if self.is_condition(&genotype[i]) && genotype[i] == genotype[i + 1] {
                    return false;
                }
            }
        }

        let depth = self.depth(genotype);
        if depth < 0 || (depth == 0 && genotype.len() > 1) {
            return false;
        }

        if self.is_control(&genotype[0]) {
            let fallback_allowed = !self.is_fallback(&genotype[0]);
            let sequence_allowed = !self.is_sequence(&genotype[0]);
            let mut cursor = 1;
            return self.subtree_valid(genotype, &mut cursor, fallback_allowed, sequence_allowed);
        }

        true
    }

    /// Walks one scope starting at `cursor`, enforcing:
    /// 1. fallbacks must not be direct children of fallbacks
    /// 2. sequences must not be direct children of sequences
    /// 3. the last child of a scope must not be a condition
    fn subtree_valid(
        &self,
        genotype: &[Token],
        cursor: &mut usize,
        fallback_allowed: bool,
        sequence_allowed: bool,
    ) -> bool {
        while *cursor < genotype.len() {
            let node = &genotype[*cursor];
            *cursor += 1;

            if self.is_up(node) {
                return true;
            } else if self.is_condition(node) {
                if *cursor < genotype.len() && self.is_up(&genotype[*cursor]) {
                    return false;
                }
            } else if self.is_atomic_fallback(node) {
                if !fallback_allowed {
                    return false;
                }
            } else if self.is_atomic_sequence(node) {
                if !sequence_allowed {
                    return false;
                }
            } else if self.is_control(node) {
                if self.is_fallback(node) {
                    if !fallback_allowed
                        || !self.subtree_valid(genotype, cursor, false, true)
                    {
                        return false;
                    }
                } else if self.is_sequence(node) {
                    if !sequence_allowed
                        || !self.subtree_valid(genotype, cursor, true, false)
                    {
                        return false;
                    }
                } else if !self.subtree_valid(genotype, cursor, true, true) {
                    return false;
                }
            }
        }

        // ran off the end without a close
        false
    }

    /// Maximum nesting depth of the genotype, or -1 when the bracket
    /// structure is malformed: the balance goes negative, ends nonzero, or
    /// reaches zero before the final token.
    pub fn depth(&self, genotype: &[Token]) -> i64 {
        let mut depth = 0i64;
        let mut max_depth = 0i64;

        for (i, token) in genotype.iter().enumerate() {
            if self.is_control(token) {
                depth += 1;
                max_depth = max_depth.max(depth);
            } else if self.is_up(token) {
                depth -= 1;
                if depth < 0 || (depth == 0 && i != genotype.len() - 1) {
                    return -1;
                }
            }
        }

        if depth != 0 {
            return -1;
        }

        max_depth
    }

    /// Number of nodes in the genotype. Close-markers are not counted.
    pub fn length(&self, genotype: &[Token]) -> usize {
        genotype.iter().filter(|t| !self.is_up(t)).count()
    }

    /// Repairs the bracket structure: appends the root close if missing,
    /// appends closes for unmatched opens, and removes excess closes by
    /// scanning from the end. The final token is never removed.
    pub fn close(&self, genotype: &mut Genotype) {
        if let (Some(first), Some(last)) = (genotype.first(), genotype.last()) {
            if self.is_control(first) && !self.is_up(last) {
                genotype.push(self.up().clone());
            }
        }

        let mut open_scopes = 0i64;
        for token in genotype.iter() {
            if self.is_control(token) {
                open_scopes += 1;
            } else if self.is_up(token) {
                open_scopes -= 1;
            }
        }

        if open_scopes > 0 {
            for _ in 0..open_scopes {
                genotype.push(self.up().clone());
            }
        } else if open_scopes < 0 {
            for _ in 0..(-open_scopes) {
                for j in (1..genotype.len().saturating_sub(1)).rev() {
                    if self.is_up(&genotype[j]) {
                        genotype.remove(j);
                        break;
                    }
                }
            }
        }
    }

    /// Index of the close-marker matching the control token at `index`.
    pub fn matching_close(&self, genotype: &[Token], index: usize) -> Result<usize, BtLearnError> {
        if index >= genotype.len() || !self.is_control(&genotype[index]) {
            return Err(BtLearnError::Structural(format!(
                "matching close queried for index {} which is not a control token",
                index
            )));
        }

        if index == 0 {
            return match genotype.last() {
                Some(last) if self.is_up(last) => Ok(genotype.len() - 1),
                _ => Err(BtLearnError::Structural(
                    "genotype root scope has no close-marker".to_string(),
                )),
            };
        }

        let mut level = 1i64;
        let mut i = index;
        loop {
            i += 1;
            if i == genotype.len() {
                return Err(BtLearnError::Structural(
                    "no matching close-marker found".to_string(),
                ));
            }
            if self.is_control(&genotype[i]) {
                level += 1;
            } else if self.is_up(&genotype[i]) {
                level -= 1;
                if level == 0 {
                    return Ok(i);
                }
            }
        }
    }

    /// Index of the closest enclosing control scope, or `None` for the root.
    pub fn parent(&self, genotype: &[Token], index: usize) -> Option<usize> {
        if index == 0 {
            return None;
        }

        let mut parent = index;
        let mut closed_siblings = 0usize;
        while parent > 0 {
            parent -= 1;
            if self.is_control(&genotype[parent]) {
                if closed_siblings == 0 {
                    return Some(parent);
                }
                closed_siblings -= 1;
            } else if self.is_up(&genotype[parent]) {
                closed_siblings += 1;
            }
        }
        None
    }

    /// Indices of fallback- or sequence-type scopes at the same level,
    /// scanning from `index` forward to the end of the enclosing scope.
    pub fn child_control_scopes(&self, genotype: &[Token], index: usize) -> Vec<usize> {
        let mut scopes = Vec::new();
        let mut level = 0i64;
        let mut i = index;

        while level >= 0 && i < genotype.len() {
            let token = &genotype[i];
            if level == 0 && (self.is_fallback(token) || self.is_sequence(token)) {
                scopes.push(i);
            }
            if self.is_control(token) {
                level += 1;
            } else if self.is_up(token) {
                level -= 1;
            }
            i += 1;
        }

        scopes
    }

    /// Tokens of the subtree rooted at `index`: the single token for a leaf,
    /// the full scope for a control, empty for a close-marker.
    pub fn subtree(&self, genotype: &[Token], index: usize) -> Result<Vec<Token>, BtLearnError> {
        if self.is_leaf(&genotype[index]) {
            Ok(vec![genotype[index].clone()])
        } else if self.is_control(&genotype[index]) {
            let close = self.matching_close(genotype, index)?;
            Ok(genotype[index..=close].to_vec())
        } else {
            Ok(Vec::new())
        }
    }

    /// Whether the token at `index` roots a swappable subtree.
    pub fn is_subtree_root(&self, genotype: &[Token], index: usize) -> bool {
        index < genotype.len() && !self.is_up(&genotype[index])
    }

    /// Draws a random token. The leaf pool is usually much larger than the
    /// control pool, but the final distribution should still be roughly
    /// 50/50 between the two kinds, with close-markers grouped with the
    /// controls and leaves split 30/70 between conditions and actions.
    pub fn random_node<R: Rng>(&self, rng: &mut R) -> Token {
        if rng.gen::<f64>() < 0.5 {
            let pool = self.controls.len() + self.ups.len();
            let i = rng.gen_range(0..pool);
            if i < self.controls.len() {
                self.controls[i].clone()
            } else {
                self.ups[i - self.controls.len()].clone()
            }
        } else if rng.gen::<f64>() < 0.3 {
            self.random_condition(rng)
        } else {
            self.random_action(rng)
        }
    }

    pub fn random_fallback<R: Rng>(&self, rng: &mut R) -> Token {
        self.fallbacks[rng.gen_range(0..self.fallbacks.len())].clone()
    }

    pub fn random_sequence<R: Rng>(&self, rng: &mut R) -> Token {
        self.sequences[rng.gen_range(0..self.sequences.len())].clone()
    }

    pub fn random_control<R: Rng>(&self, rng: &mut R) -> Token {
        self.controls[rng.gen_range(0..self.controls.len())].clone()
    }

    pub fn random_condition<R: Rng>(&self, rng: &mut R) -> Token {
        self.conditions[rng.gen_range(0..self.conditions.len())].clone()
    }

    pub fn random_action<R: Rng>(&self, rng: &mut R) -> Token {
        self.actions[rng.gen_range(0..self.actions.len())].clone()
    }

    pub fn random_behavior<R: Rng>(&self, rng: &mut R) -> Token {
        self.behaviors[rng.gen_range(0..self.behaviors.len())].clone()
    }

    pub fn random_leaf<R: Rng>(&self, rng: &mut R) -> Token {
        self.leaves[rng.gen_range(0..self.leaves.len())].clone()
    }

    /// Generates a random genotype aiming at `target_length` nodes,
    /// following the validity rules where cheap to do so and regenerating
    /// until `validate` succeeds. Returns the empty sentinel after
    /// exhausting the attempt budget.
    pub fn random_genotype<R: Rng>(&self, rng: &mut R, target_length: usize) -> Genotype {
        for _ in 0..MAX_ATTEMPTS {
            let mut genotype: Genotype = Vec::new();

            if target_length == 1 {
                genotype.push(self.random_behavior(rng));
            } else {
                genotype.push(self.random_control(rng));
                for _ in 0..target_length - 1 {
                    if self.is_control(&genotype[genotype.len() - 1]) {
                        let mut next = self.random_node(rng);
                        while self.is_up(&next) {
                            next = self.random_node(rng);
                        }
                        genotype.push(next);
                    } else {
                        genotype.push(self.random_node(rng));
                    }

                    if self.is_action(&genotype[genotype.len() - 1]) {
                        genotype.push(self.up().clone());
                    }
                }

                // pad with conditions when random close-markers ate into the
                // node budget; conditions make a valid result more likely
                let current = self.length(&genotype);
                if target_length > current + 1 {
                    for _ in 0..(target_length - current - 1) {
                        genotype.push(self.random_condition(rng));
                    }
                }
                if self.length(&genotype) < target_length {
                    genotype.push(self.random_behavior(rng));
                }
                self.close(&mut genotype);
            }

            if self.validate(&genotype) {
                return genotype;
            }
        }

        log::debug!(
            "random genotype generation exhausted after {} attempts",
            MAX_ATTEMPTS
        );
        Genotype::new()
    }
}
