use super::traits::ConfigSection;
use crate::error::BtLearnError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Raw grammar table: token category -> token list.
///
/// Loaded once per run, before any grammar operation. The derived sets
/// (all controls, all leaves, all tokens) are computed by
/// [`Grammar::new`](crate::engines::generation::grammar::Grammar::new),
/// which consumes a validated copy of this table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrammarConfig {
    /// Fallback-type control tokens, typically just one.
    #[serde(default)]
    pub fallback_nodes: Vec<String>,
    /// Sequence-type control tokens, typically just one.
    #[serde(default)]
    pub sequence_nodes: Vec<String>,
    /// Control tokens of neither family, e.g. parallel nodes.
    #[serde(default)]
    pub control_nodes: Vec<String>,
    /// Childless leaves that never keep running. Never the last child of a scope.
    #[serde(default)]
    pub condition_nodes: Vec<String>,
    /// Childless leaves that may keep running and may end a scope.
    #[serde(default)]
    pub action_nodes: Vec<String>,
    /// Leaves expanding to a fixed fallback; may not be children of fallbacks.
    #[serde(default)]
    pub atomic_fallback_nodes: Vec<String>,
    /// Leaves expanding to a fixed sequence; may not be children of sequences.
    #[serde(default)]
    pub atomic_sequence_nodes: Vec<String>,
    /// Close-marker tokens ending the nearest open scope.
    #[serde(default)]
    pub up_node: Vec<String>,
}

impl GrammarConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BtLearnError> {
        let contents = std::fs::read_to_string(path)?;
        let config: GrammarConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn categories(&self) -> [(&'static str, &[String]); 8] {
        [
            ("fallback_nodes", &self.fallback_nodes),
            ("sequence_nodes", &self.sequence_nodes),
            ("control_nodes", &self.control_nodes),
            ("condition_nodes", &self.condition_nodes),
            ("action_nodes", &self.action_nodes),
            ("atomic_fallback_nodes", &self.atomic_fallback_nodes),
            ("atomic_sequence_nodes", &self.atomic_sequence_nodes),
            ("up_node", &self.up_node),
        ]
    }
}

impl ConfigSection for GrammarConfig {
    fn section_name() -> &'static str {
        "grammar"
    }

    fn validate(&self) -> Result<(), BtLearnError> {
        for (name, tokens) in [
            ("fallback_nodes", &self.fallback_nodes),
            ("sequence_nodes", &self.sequence_nodes),
            ("condition_nodes", &self.condition_nodes),
            ("action_nodes", &self.action_nodes),
            ("up_node", &self.up_node),
        ] {
            if tokens.is_empty() {
                return Err(BtLearnError::Configuration(format!(
                    "Grammar category '{}' must not be empty",
                    name
                )));
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (name, tokens) in self.categories() {
            for token in tokens {
                if token.is_empty() {
                    return Err(BtLearnError::Configuration(format!(
                        "Grammar category '{}' contains an empty token",
                        name
                    )));
                }
                if !seen.insert(token.as_str()) {
                    return Err(BtLearnError::Configuration(format!(
                        "Token '{}' belongs to more than one grammar category",
                        token
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> GrammarConfig {
        GrammarConfig {
            fallback_nodes: vec!["f(".to_string()],
            sequence_nodes: vec!["s(".to_string()],
            condition_nodes: vec!["c1".to_string()],
            action_nodes: vec!["a1".to_string()],
            up_node: vec![")".to_string()],
            ..GrammarConfig::default()
        }
    }

    #[test]
    fn test_minimal_config_valid() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_missing_category_rejected() {
        let mut config = minimal();
        config.action_nodes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlapping_token_rejected() {
        let mut config = minimal();
        config.condition_nodes.push("a1".to_string());
        assert!(config.validate().is_err());
    }
}
