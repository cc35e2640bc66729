//! Graph analysis over the model arena.
//!
//! The draw scheduler only cares about *named* nodes: unnamed intermediate
//! expressions are walked through but never recorded. Relations follow the
//! data flow:
//! - `parents[n]` are the named nodes that directly consume `n`
//!   (no named node in between),
//! - `children[n]` are the named nodes `n` is directly computed from.
//!
//! Leaves are named nodes without graph inputs (free random variables,
//! named constants and shared data), the natural starting points for a
//! forward pass.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{Model, NodeId};
use crate::error::PredictiveError;

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Named leaves in discovery order, without duplicates.
    pub leaves: Vec<NodeId>,
    pub parents: HashMap<NodeId, BTreeSet<NodeId>>,
    pub children: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    /// Walk every ancestor of `root` and record the named-node relations.
    pub fn discover(model: &Model, root: NodeId) -> Result<Self, PredictiveError> {
        let mut graph = DependencyGraph::default();
        let mut visited: HashSet<(NodeId, Option<NodeId>)> = HashSet::new();
        let mut stack = vec![(root, None::<NodeId>)];

        while let Some((id, consumer)) = stack.pop() {
            if !visited.insert((id, consumer)) {
                continue;
            }
            let node = model.node(id)?;
            let inputs = node.graph_inputs();

            let mut next_consumer = consumer;
            if node.name.is_some() {
                graph.parents.entry(id).or_default();
                graph.children.entry(id).or_default();
                if let Some(consumer) = consumer {
                    graph.parents.entry(id).or_default().insert(consumer);
                    graph.children.entry(consumer).or_default().insert(id);
                }
                if inputs.is_empty() && !graph.leaves.contains(&id) {
                    graph.leaves.push(id);
                }
                next_consumer = Some(id);
            }

            // Reverse so inputs are visited left to right.
            for input in inputs.into_iter().rev() {
                stack.push((input, next_consumer));
            }
        }

        Ok(graph)
    }

    /// Discover and merge the graphs of several roots.
    pub fn for_roots(
        model: &Model,
        roots: impl IntoIterator<Item = NodeId>,
    ) -> Result<Self, PredictiveError> {
        let mut graph = DependencyGraph::default();
        for root in roots {
            graph.merge(DependencyGraph::discover(model, root)?);
        }
        Ok(graph)
    }

    /// Union relations per node; leaves keep first-seen order.
    pub fn merge(&mut self, other: DependencyGraph) {
        for leaf in other.leaves {
            if !self.leaves.contains(&leaf) {
                self.leaves.push(leaf);
            }
        }
        for (id, parents) in other.parents {
            self.parents.entry(id).or_default().extend(parents);
        }
        for (id, children) in other.children {
            self.children.entry(id).or_default().extend(children);
        }
    }

    pub fn parents_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.parents.get(&id).into_iter().flatten().copied()
    }

    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    pub fn has_child(&self, id: NodeId, child: NodeId) -> bool {
        self.children
            .get(&id)
            .is_some_and(|children| children.contains(&child))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.parents.contains_key(&id)
    }

    /// Number of named nodes visited.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Every node `root` is computed from, stopping at (but including) blockers.
pub fn ancestors(
    model: &Model,
    root: NodeId,
    blockers: &HashSet<NodeId>,
) -> Result<HashSet<NodeId>, PredictiveError> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) || blockers.contains(&id) {
            continue;
        }
        stack.extend(model.node(id)?.graph_inputs());
    }
    Ok(seen)
}
