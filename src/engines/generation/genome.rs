/// Genotype representation for genetic programming over behavior trees
///
/// A genotype is a flat sequence of string tokens encoding a behavior tree
/// in depth-first order. Control tokens open a scope, the close-marker token
/// ends the nearest open scope, and every other token is a leaf:
///
/// ```text
/// ["f(", "c1", "s(", "a1", "a2", ")", ")"]
/// ```
///
/// encodes a fallback whose children are the condition `c1` and a sequence
/// of the actions `a1` and `a2`.
///
/// # Why a flat sequence instead of a tree?
///
/// Genetic operators work best on simple, linear structures:
/// - **Crossover**: swapping subtrees is range splicing
/// - **Mutation**: inserting, deleting or substituting single tokens
/// - **Hashing**: the token sequence is directly usable as a cache key
///
/// The price is that not every sequence is a tree; the [`Grammar`] decides
/// which sequences are valid and repairs unbalanced ones.
///
/// [`Grammar`]: crate::engines::generation::grammar::Grammar
pub type Token = String;

/// Flat token-sequence encoding of a behavior tree.
pub type Genotype = Vec<Token>;

/// Renders a genotype as a single human-readable line, also used as the
/// deduplication signature in the hall of fame.
pub fn format_genotype(genotype: &[Token]) -> String {
    genotype.join(" ")
}
