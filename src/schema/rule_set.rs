/// Rule tables — RON-serialisable lists of terminals and rule strings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::core::grammar::{Grammar, GrammarConfig, GrammarError};

/// A rule table as stored on disk.
///
/// Terminals are installed first, then rules are compiled in declaration
/// order, so a later entry for the same name redefines the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub config: GrammarConfig,
    /// `(name, value)` pairs installed as leaves.
    #[serde(default)]
    pub terminals: Vec<(String, String)>,
    /// `(name, rule text)` pairs compiled in order.
    #[serde(default)]
    pub rules: Vec<(String, String)>,
}

impl RuleSet {
    /// Load a rule set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<RuleSet, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a rule set from a RON string.
    pub fn parse_ron(input: &str) -> Result<RuleSet, GrammarError> {
        Ok(ron::from_str(input)?)
    }

    /// Append another rule set. Its config replaces ours, and its entries
    /// are compiled after ours so they take precedence.
    pub fn merge(&mut self, other: RuleSet) {
        self.config = other.config;
        self.terminals.extend(other.terminals);
        self.rules.extend(other.rules);
    }

    /// Install every terminal and rule into an existing grammar.
    pub fn apply_to<D: From<String>>(&self, grammar: &mut Grammar<D>) -> Result<(), GrammarError> {
        for (name, value) in &self.terminals {
            grammar.register_terminal(name, D::from(value.clone()));
        }
        for (name, text) in &self.rules {
            grammar.compile(name, text)?;
        }
        debug!(
            terminals = self.terminals.len(),
            rules = self.rules.len(),
            "applied rule set"
        );
        Ok(())
    }

    /// Build a string grammar from this rule set and its config.
    pub fn build(&self) -> Result<Grammar<String>, GrammarError> {
        let mut grammar = Grammar::<String>::builder()
            .config(self.config.clone())
            .string_literals()
            .build()?;
        self.apply_to(&mut grammar)?;
        Ok(grammar)
    }
}
