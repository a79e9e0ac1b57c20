/// Stochastic grammar runtime — rule registry, compilation, and generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::node::{total_weight, Node, NodeGraph, NodeId};
use crate::core::parser::RuleExpr;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("unresolved reference: '{0}' is not a rule and cannot be a literal")]
    UnresolvedReference(String),
    #[error("malformed numeric literal: '{0}'")]
    MalformedNumericLiteral(String),
    #[error("selector option '{0}' names no rule")]
    MissingReference(String),
    #[error("selector in rule '{0}' has no option with a positive weight")]
    NoSelectableOption(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Default fallback depth bound.
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// Turns unresolved reference text into a terminal value, if the terminal
/// type allows it.
pub type LiteralHook<D> = fn(&str) -> Option<D>;

/// Literal hook for string grammars: any unresolved text is its own value.
pub fn string_literal(text: &str) -> Option<String> {
    Some(text.to_string())
}

/// Generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Depth at which fallback nodes switch to their alternate.
    pub max_depth: u32,
    /// RNG seed for `Grammar::generate`. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            seed: None,
        }
    }
}

/// A compiled rule table. Built via `Grammar::builder()`.
pub struct Grammar<D> {
    graph: NodeGraph<D>,
    rules: FxHashMap<String, NodeId>,
    literal_hook: Option<LiteralHook<D>>,
    max_depth: u32,
    rng: StdRng,
}

/// Builder for constructing a `Grammar`.
pub struct GrammarBuilder<D> {
    config: GrammarConfig,
    literal_hook: Option<LiteralHook<D>>,
}

/// Registry and arena state captured before a compile, restored on failure.
struct Checkpoint {
    nodes: usize,
    rules: FxHashMap<String, NodeId>,
}

impl<D> Grammar<D> {
    pub fn builder() -> GrammarBuilder<D> {
        GrammarBuilder {
            config: GrammarConfig::default(),
            literal_hook: None,
        }
    }

    /// Install a leaf holding `value` under `name`. Redefining an existing
    /// name rewires every structure that referenced the old node.
    pub fn register_terminal(&mut self, name: &str, value: D) {
        let id = self.graph.insert(Node::Leaf(value));
        self.install(name, id);
    }

    /// Compile `rule_text` and install the result under `name`.
    ///
    /// Referenced names that are not yet registered are compiled as rule
    /// text of their own. On error nothing is installed.
    pub fn compile(&mut self, name: &str, rule_text: &str) -> Result<(), GrammarError> {
        let checkpoint = self.checkpoint();
        let result = self.compile_rule(name, rule_text);
        if let Err(ref e) = result {
            debug!(rule = name, error = %e, "compile failed, rolling back");
            self.rollback(checkpoint);
        }
        result
    }

    /// Point `name` at `new` and rewire every registered node that held
    /// the previous definition as a direct child.
    pub(crate) fn replace(&mut self, name: &str, new: NodeId) {
        let Some(old) = self.rules.insert(name.to_string(), new) else {
            return;
        };
        if old == new {
            return;
        }

        debug!(rule = name, old = old.index(), new = new.index(), "rewiring references");
        for id in self.rules.values() {
            self.graph.get_mut(*id).swap_child(old, new);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Node currently registered under `name`.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.rules.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node<D> {
        self.graph.get(id)
    }

    /// Registered rule names, sorted.
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered rule names.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of nodes allocated, including ones detached by redefinition.
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Rules whose expansion can loop back to themselves without passing a
    /// fallback primary branch. Generating any of them never terminates.
    pub fn unbounded_cycles(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rules
            .iter()
            .filter(|(_, id)| self.graph.reaches_itself(**id))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn compile_rule(&mut self, name: &str, rule_text: &str) -> Result<(), GrammarError> {
        debug!(rule = name, text = rule_text, "compiling rule");

        let node = match RuleExpr::parse(rule_text)? {
            RuleExpr::Reference(reference) => return self.compile_reference(name, &reference),
            RuleExpr::Fallback { primary, alternate } => {
                let primary = self.resolve(&primary)?;
                let alternate = self.resolve(&alternate)?;
                Node::Fallback { primary, alternate }
            }
            RuleExpr::Sequence(refs) => {
                let children = refs
                    .iter()
                    .map(|reference| self.resolve(reference))
                    .collect::<Result<Vec<_>, _>>()?;
                Node::Sequence(children)
            }
            RuleExpr::Selector(options) => {
                let mut weighted = Vec::with_capacity(options.len());
                for option in &options {
                    weighted.push((self.resolve(&option.reference)?, option.weight));
                }
                if !total_weight(&weighted).is_finite() {
                    return Err(GrammarError::MalformedNumericLiteral(rule_text.to_string()));
                }
                Node::select(weighted)
                    .ok_or_else(|| GrammarError::NoSelectableOption(name.to_string()))?
            }
            RuleExpr::Repetition { reference, count } => Node::Repetition {
                child: self.resolve(&reference)?,
                count,
            },
        };

        let id = self.graph.insert(node);
        self.install(name, id);
        Ok(())
    }

    /// A bare reference. The target is resolved directly or synthesized as a
    /// literal leaf; a differently named rule gets its own single-child
    /// sequence so later redefinitions of either name stay independent.
    fn compile_reference(&mut self, name: &str, reference: &str) -> Result<(), GrammarError> {
        let target = match self.rules.get(reference) {
            Some(&id) => id,
            None => {
                let value = self
                    .literal_hook
                    .and_then(|hook| hook(reference))
                    .ok_or_else(|| GrammarError::UnresolvedReference(reference.to_string()))?;
                debug!(rule = reference, "synthesized literal leaf");
                let id = self.graph.insert(Node::Leaf(value));
                self.install(reference, id);
                id
            }
        };

        if name != reference {
            let alias = self.graph.insert(Node::Sequence(vec![target]));
            self.install(name, alias);
        }
        Ok(())
    }

    /// Node for a referenced name, compiling the name as its own rule text
    /// when it is not registered yet.
    fn resolve(&mut self, reference: &str) -> Result<NodeId, GrammarError> {
        if let Some(&id) = self.rules.get(reference) {
            return Ok(id);
        }
        self.compile_rule(reference, reference)?;
        self.node_id(reference)
            .ok_or_else(|| GrammarError::UnresolvedReference(reference.to_string()))
    }

    fn install(&mut self, name: &str, id: NodeId) {
        if self.rules.contains_key(name) {
            self.replace(name, id);
        } else {
            debug!(rule = name, node = id.index(), "installing rule");
            self.rules.insert(name.to_string(), id);
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.graph.len(),
            rules: self.rules.clone(),
        }
    }

    // Nested compiles only ever insert new names; the one replace happens
    // last, so restoring the map and dropping new nodes undoes everything.
    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.rules = checkpoint.rules;
        self.graph.truncate(checkpoint.nodes);
    }
}

impl<D: Clone> Grammar<D> {
    /// Expand `name` using the grammar's own RNG.
    pub fn generate(&mut self, name: &str) -> Result<Vec<D>, GrammarError> {
        let id = self.lookup(name)?;
        let mut out = Vec::new();
        self.graph.expand(id, 0, self.max_depth, &mut self.rng, &mut out);
        trace!(rule = name, len = out.len(), "generated sequence");
        Ok(out)
    }

    /// Expand `name` with a caller-supplied random source.
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        name: &str,
        rng: &mut R,
    ) -> Result<Vec<D>, GrammarError> {
        let id = self.lookup(name)?;
        let mut out = Vec::new();
        self.graph.expand(id, 0, self.max_depth, rng, &mut out);
        trace!(rule = name, len = out.len(), "generated sequence");
        Ok(out)
    }

    fn lookup(&self, name: &str) -> Result<NodeId, GrammarError> {
        self.node_id(name)
            .ok_or_else(|| GrammarError::RuleNotFound(name.to_string()))
    }
}

impl<D> GrammarBuilder<D> {
    pub fn config(mut self, config: GrammarConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Hook used to synthesize a leaf from reference text no rule matches.
    pub fn literal_hook(mut self, hook: LiteralHook<D>) -> Self {
        self.literal_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<Grammar<D>, GrammarError> {
        if self.config.max_depth == 0 {
            return Err(GrammarError::InvalidConfig(
                "max_depth must be positive".to_string(),
            ));
        }

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Grammar {
            graph: NodeGraph::new(),
            rules: FxHashMap::default(),
            literal_hook: self.literal_hook,
            max_depth: self.config.max_depth,
            rng,
        })
    }
}

impl GrammarBuilder<String> {
    /// Treat unresolved reference text as a literal string value.
    pub fn string_literals(self) -> Self {
        self.literal_hook(string_literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Grammar<u32> {
        let mut g = Grammar::builder().seed(3).max_depth(3).build().unwrap();
        g.register_terminal("A", 1);
        g.register_terminal("B", 2);
        g
    }

    fn text() -> Grammar<String> {
        Grammar::<String>::builder().seed(3).string_literals().build().unwrap()
    }

    #[test]
    fn terminal_generates_itself() {
        let mut g = tokens();
        assert_eq!(g.generate("A").unwrap(), vec![1]);
    }

    #[test]
    fn sequence_rule() {
        let mut g = tokens();
        g.compile("AB", "A & B & A").unwrap();
        assert_eq!(g.generate("AB").unwrap(), vec![1, 2, 1]);
    }

    #[test]
    fn repetition_rule() {
        let mut g = tokens();
        g.compile("AAA", "A # 3").unwrap();
        assert_eq!(g.generate("AAA").unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn bare_reference_aliases_rule() {
        let mut g = tokens();
        g.compile("alias", "B").unwrap();
        assert_eq!(g.generate("alias").unwrap(), vec![2]);
    }

    #[test]
    fn compiling_name_as_itself_is_noop() {
        let mut g = tokens();
        let before = g.node_id("A");
        g.compile("A", "A").unwrap();
        assert_eq!(g.node_id("A"), before);
        assert_eq!(g.generate("A").unwrap(), vec![1]);
    }

    #[test]
    fn redefinition_rewires_dependents() {
        let mut g = tokens();
        g.compile("R", "A & B").unwrap();
        g.compile("A", "B # 2").unwrap();
        assert_eq!(g.generate("R").unwrap(), vec![2, 2, 2]);

        g.register_terminal("B", 7);
        assert_eq!(g.generate("R").unwrap(), vec![7, 7, 7]);
    }

    #[test]
    fn redefining_alias_leaves_target_alone() {
        let mut g = tokens();
        g.compile("alias", "A").unwrap();
        g.compile("R", "A & alias").unwrap();
        g.compile("alias", "B").unwrap();

        assert_eq!(g.generate("A").unwrap(), vec![1]);
        assert_eq!(g.generate("R").unwrap(), vec![1, 2]);
    }

    #[test]
    fn redefining_target_propagates_through_alias() {
        let mut g = tokens();
        g.compile("alias", "A").unwrap();
        g.register_terminal("A", 9);
        assert_eq!(g.generate("alias").unwrap(), vec![9]);
    }

    #[test]
    fn replace_with_same_node_is_noop() {
        let mut g = tokens();
        g.compile("R", "A & B").unwrap();
        let a = g.node_id("A").unwrap();
        g.replace("A", a);
        assert_eq!(g.node_id("A"), Some(a));
        assert_eq!(g.generate("R").unwrap(), vec![1, 2]);
    }

    #[test]
    fn operand_compiled_as_its_own_rule() {
        let mut g = tokens();
        g.compile("R", "A # 2 & B").unwrap();
        assert!(g.contains("A # 2"));
        assert_eq!(g.generate("R").unwrap(), vec![1, 1, 2]);
    }

    #[test]
    fn missing_rule_is_not_found() {
        let mut g = tokens();
        let nodes = g.node_count();
        let err = g.generate("missing").unwrap_err();
        assert!(matches!(err, GrammarError::RuleNotFound(ref n) if n == "missing"));
        assert_eq!(g.node_count(), nodes);
        assert!(!g.contains("missing"));
    }

    #[test]
    fn unresolved_reference_without_literal_hook() {
        let mut g = tokens();
        let err = g.compile("X", "A & Y").unwrap_err();
        assert!(matches!(err, GrammarError::UnresolvedReference(ref r) if r == "Y"));
        assert!(!g.contains("X"));
    }

    #[test]
    fn string_literals_synthesize_leaves() {
        let mut g = text();
        g.compile("X", "hello & world").unwrap();
        assert_eq!(g.generate("X").unwrap(), vec!["hello", "world"]);
        assert!(g.contains("world"));
    }

    #[test]
    fn failed_compile_rolls_back() {
        let mut g = tokens();
        let nodes = g.node_count();
        let err = g.compile("R", "A # 2 & C").unwrap_err();
        assert!(matches!(err, GrammarError::UnresolvedReference(_)));
        assert!(!g.contains("A # 2"));
        assert!(!g.contains("R"));
        assert_eq!(g.len(), 2);
        assert_eq!(g.node_count(), nodes);
    }

    #[test]
    fn failed_redefinition_keeps_old_definition() {
        let mut g = tokens();
        g.compile("R", "A & B").unwrap();
        assert!(g.compile("R", "A # lots").is_err());
        assert_eq!(g.generate("R").unwrap(), vec![1, 2]);
    }

    #[test]
    fn all_zero_selector_rejected() {
        let mut g = tokens();
        let err = g.compile("S", "0 A | 0 B").unwrap_err();
        assert!(matches!(err, GrammarError::NoSelectableOption(ref n) if n == "S"));
    }

    #[test]
    fn overflowing_selector_weights_rejected() {
        let mut g = tokens();
        let nodes = g.node_count();
        let err = g.compile("S", "3e38 A | 3e38 B").unwrap_err();
        assert!(matches!(err, GrammarError::MalformedNumericLiteral(ref t) if t == "3e38 A | 3e38 B"));
        assert!(!g.contains("S"));
        assert_eq!(g.len(), 2);
        assert_eq!(g.node_count(), nodes);

        g.compile("S", "3e38 A | 1 B").unwrap();
        assert_eq!(g.generate("S").unwrap().len(), 1);
    }

    #[test]
    fn oversized_repeat_count_rejected() {
        let mut g = tokens();
        let nodes = g.node_count();
        assert!(matches!(
            g.compile("S", "A # 1e30"),
            Err(GrammarError::MalformedNumericLiteral(ref t)) if t == "1e30"
        ));
        assert!(!g.contains("S"));
        assert_eq!(g.node_count(), nodes);
    }

    #[test]
    fn fallback_bounds_self_reference() {
        let mut g = tokens();
        g.register_terminal("list", 0);
        g.compile("more", "A & list").unwrap();
        g.compile("list", "more -> B").unwrap();

        assert_eq!(g.generate("list").unwrap(), vec![1, 1, 1, 2]);
        assert!(g.unbounded_cycles().is_empty());
    }

    #[test]
    fn unbounded_cycle_reported() {
        let mut g = tokens();
        g.register_terminal("loop", 0);
        g.compile("body", "A & loop").unwrap();
        g.compile("loop", "1 body | 1 B").unwrap();
        assert_eq!(g.unbounded_cycles(), vec!["body".to_string(), "loop".to_string()]);
    }

    #[test]
    fn zero_max_depth_rejected() {
        let result = Grammar::<u32>::builder().max_depth(0).build();
        assert!(matches!(result, Err(GrammarError::InvalidConfig(_))));
    }

    #[test]
    fn seeded_generation_is_repeatable() {
        let build = || {
            let mut g = Grammar::builder().seed(11).build().unwrap();
            g.register_terminal("A", 'a');
            g.register_terminal("B", 'b');
            g.compile("S", "1 A | 1 B").unwrap();
            g.compile("R", "S # 20").unwrap();
            g
        };
        let mut first = build();
        let mut second = build();
        assert_eq!(first.generate("R").unwrap(), second.generate("R").unwrap());
    }

    #[test]
    fn rule_names_sorted() {
        let mut g = tokens();
        g.compile("C", "A & B").unwrap();
        assert_eq!(g.rule_names(), vec!["A", "B", "C"]);
    }
}
