/// Compiled grammar nodes — the node arena and its expansion semantics.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use rustc_hash::FxHashSet;
use tracing::trace;

/// Index of a node inside a [`NodeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A compiled grammar node. Children are arena indices, so nodes can be
/// shared between parents and the graph may contain cycles.
#[derive(Debug, Clone)]
pub enum Node<D> {
    /// Exactly one terminal value.
    Leaf(D),
    /// Children expanded in order and concatenated.
    Sequence(Vec<NodeId>),
    /// One child, picked with probability proportional to its weight.
    Select {
        options: Vec<(NodeId, f32)>,
        distribution: WeightedIndex<f32>,
    },
    /// One child, expanded a fixed number of times.
    Repetition { child: NodeId, count: f32 },
    /// `primary` while below the depth bound, `alternate` once it is reached.
    Fallback { primary: NodeId, alternate: NodeId },
}

impl<D> Node<D> {
    /// Build a select node. Returns `None` when no option can ever be
    /// chosen (empty list, or every weight zero) or the weights overflow.
    pub fn select(options: Vec<(NodeId, f32)>) -> Option<Node<D>> {
        if !total_weight(&options).is_finite() {
            return None;
        }
        let distribution = WeightedIndex::new(options.iter().map(|(_, weight)| *weight)).ok()?;
        Some(Node::Select {
            options,
            distribution,
        })
    }

    /// Replace every direct child reference equal to `old` with `new`.
    /// Shallow: grandchildren are left to their own parents.
    pub fn swap_child(&mut self, old: NodeId, new: NodeId) {
        let swap = |id: &mut NodeId| {
            if *id == old {
                *id = new;
            }
        };
        match self {
            Node::Leaf(_) => {}
            Node::Sequence(children) => children.iter_mut().for_each(swap),
            Node::Select { options, .. } => options.iter_mut().for_each(|(id, _)| swap(id)),
            Node::Repetition { child, .. } => swap(child),
            Node::Fallback { primary, alternate } => {
                swap(primary);
                swap(alternate);
            }
        }
    }

    /// Direct children in declaration order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Leaf(_) => Vec::new(),
            Node::Sequence(children) => children.clone(),
            Node::Select { options, .. } => options.iter().map(|(id, _)| *id).collect(),
            Node::Repetition { child, .. } => vec![*child],
            Node::Fallback { primary, alternate } => vec![*primary, *alternate],
        }
    }

    /// Children that expansion can actually visit without passing a
    /// fallback's depth check.
    fn unbounded_children(&self) -> Vec<NodeId> {
        match self {
            Node::Leaf(_) => Vec::new(),
            Node::Sequence(children) => children.clone(),
            Node::Select { options, .. } => options
                .iter()
                .filter(|(_, weight)| *weight > 0.0)
                .map(|(id, _)| *id)
                .collect(),
            Node::Repetition { child, count } if repeat_count(*count) > 0 => vec![*child],
            Node::Repetition { .. } => Vec::new(),
            Node::Fallback { alternate, .. } => vec![*alternate],
        }
    }
}

/// Sum of option weights, accumulated in declaration order.
pub fn total_weight(options: &[(NodeId, f32)]) -> f32 {
    options.iter().map(|(_, weight)| *weight).sum()
}

/// Number of times a repetition node expands its child: the repeat
/// parameter rounded to the nearest non-negative integer. The parser caps
/// the parameter at `MAX_REPEAT_COUNT`.
pub fn repeat_count(count: f32) -> usize {
    count.round().max(0.0) as usize
}

/// Whether a fallback node at `depth` takes its primary branch.
pub fn takes_primary(depth: u32, max_depth: u32) -> bool {
    depth < max_depth
}

/// Arena owning every node ever compiled. Nodes are never freed; a node
/// detached by a redefinition simply stops being reachable.
#[derive(Debug, Clone)]
pub struct NodeGraph<D> {
    nodes: Vec<Node<D>>,
}

impl<D> Default for NodeGraph<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> NodeGraph<D> {
    pub fn new() -> Self {
        NodeGraph { nodes: Vec::new() }
    }

    pub fn insert(&mut self, node: Node<D>) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> &Node<D> {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node<D> {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node allocated after the arena had `len` nodes.
    /// Only valid while no older node references the dropped ones.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    /// Whether `start` can reach itself through children that are not
    /// guarded by a fallback depth check. Expanding such a node never ends.
    pub fn reaches_itself(&self, start: NodeId) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = self.get(start).unbounded_children();

        while let Some(id) = stack.pop() {
            if id == start {
                return true;
            }
            if visited.insert(id) {
                stack.extend(self.get(id).unbounded_children());
            }
        }

        false
    }
}

impl<D: Clone> NodeGraph<D> {
    /// Expand `id` at recursion depth `depth`, appending terminals to `out`.
    pub fn expand<R: Rng + ?Sized>(
        &self,
        id: NodeId,
        depth: u32,
        max_depth: u32,
        rng: &mut R,
        out: &mut Vec<D>,
    ) {
        match self.get(id) {
            Node::Leaf(value) => out.push(value.clone()),
            Node::Sequence(children) => {
                for child in children {
                    self.expand(*child, depth, max_depth, rng, out);
                }
            }
            Node::Select {
                options,
                distribution,
            } => {
                let (child, _) = options[distribution.sample(rng)];
                self.expand(child, depth, max_depth, rng, out);
            }
            Node::Repetition { child, count } => {
                for _ in 0..repeat_count(*count) {
                    self.expand(*child, depth, max_depth, rng, out);
                }
            }
            Node::Fallback { primary, alternate } => {
                if takes_primary(depth, max_depth) {
                    self.expand(*primary, depth + 1, max_depth, rng, out);
                } else {
                    trace!(depth, node = id.index(), "depth bound reached, taking alternate");
                    self.expand(*alternate, depth, max_depth, rng, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn expand_all(graph: &NodeGraph<char>, id: NodeId, max_depth: u32) -> Vec<char> {
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = Vec::new();
        graph.expand(id, 0, max_depth, &mut rng, &mut out);
        out
    }

    #[test]
    fn leaf_expands_to_single_value() {
        let mut graph = NodeGraph::new();
        let leaf = graph.insert(Node::Leaf('x'));
        assert_eq!(expand_all(&graph, leaf, 4), vec!['x']);
    }

    #[test]
    fn sequence_preserves_order() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        let b = graph.insert(Node::Leaf('b'));
        let seq = graph.insert(Node::Sequence(vec![b, a, b]));
        assert_eq!(expand_all(&graph, seq, 4), vec!['b', 'a', 'b']);
    }

    #[test]
    fn repetition_rounds_count() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        let rep = graph.insert(Node::Repetition { child: a, count: 2.6 });
        assert_eq!(expand_all(&graph, rep, 4), vec!['a', 'a', 'a']);

        let none = graph.insert(Node::Repetition { child: a, count: 0.2 });
        assert!(expand_all(&graph, none, 4).is_empty());
    }

    #[test]
    fn select_never_picks_zero_weight() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        let b = graph.insert(Node::Leaf('b'));
        let select = graph.insert(Node::select(vec![(a, 0.0), (b, 1.0)]).unwrap());

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut out = Vec::new();
            graph.expand(select, 0, 4, &mut rng, &mut out);
            assert_eq!(out, vec!['b']);
        }
    }

    #[test]
    fn select_rejects_empty_and_all_zero() {
        assert!(Node::<char>::select(Vec::new()).is_none());
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        assert!(Node::<char>::select(vec![(a, 0.0), (a, 0.0)]).is_none());
    }

    #[test]
    fn select_rejects_overflowing_weights() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        let b = graph.insert(Node::Leaf('b'));
        assert!(total_weight(&[(a, 3e38), (b, 3e38)]).is_infinite());
        assert!(Node::<char>::select(vec![(a, 3e38), (b, 3e38)]).is_none());
        assert!(Node::<char>::select(vec![(a, 3e38), (b, 1.0)]).is_some());
    }

    #[test]
    fn fallback_switches_at_bound() {
        assert!(takes_primary(0, 1));
        assert!(!takes_primary(1, 1));
        assert!(!takes_primary(5, 3));
    }

    #[test]
    fn self_referential_fallback_terminates() {
        // loop = (x & loop) -> end
        let mut graph = NodeGraph::new();
        let x = graph.insert(Node::Leaf('x'));
        let end = graph.insert(Node::Leaf('e'));
        let body = graph.insert(Node::Sequence(vec![x]));
        let fallback = graph.insert(Node::Fallback {
            primary: body,
            alternate: end,
        });
        if let Node::Sequence(children) = graph.get_mut(body) {
            children.push(fallback);
        }

        assert_eq!(expand_all(&graph, fallback, 3), vec!['x', 'x', 'x', 'e']);
        assert_eq!(expand_all(&graph, fallback, 1), vec!['x', 'e']);
    }

    #[test]
    fn swap_child_replaces_direct_references() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        let b = graph.insert(Node::Leaf('b'));
        let seq = graph.insert(Node::Sequence(vec![a, b, a]));
        let fallback = graph.insert(Node::Fallback {
            primary: a,
            alternate: a,
        });

        graph.get_mut(seq).swap_child(a, b);
        graph.get_mut(fallback).swap_child(a, b);

        assert_eq!(graph.get(seq).children(), vec![b, b, b]);
        assert_eq!(graph.get(fallback).children(), vec![b, b]);
    }

    #[test]
    fn swap_child_keeps_select_weights() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(Node::Leaf('a'));
        let b = graph.insert(Node::Leaf('b'));
        let mut select = Node::<char>::select(vec![(a, 0.0), (a, 2.0)]).unwrap();
        select.swap_child(a, b);

        match select {
            Node::Select { options, .. } => assert_eq!(options, vec![(b, 0.0), (b, 2.0)]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn cycle_detection_ignores_fallback_primary() {
        let mut graph = NodeGraph::new();
        let end = graph.insert(Node::Leaf('e'));
        let body = graph.insert(Node::Sequence(Vec::new()));
        let bounded = graph.insert(Node::Fallback {
            primary: body,
            alternate: end,
        });
        if let Node::Sequence(children) = graph.get_mut(body) {
            children.push(bounded);
        }
        assert!(!graph.reaches_itself(bounded));

        let unbounded = graph.insert(Node::Sequence(Vec::new()));
        if let Node::Sequence(children) = graph.get_mut(unbounded) {
            children.push(unbounded);
        }
        assert!(graph.reaches_itself(unbounded));
    }
}
