//! Resolution scheduler.
//!
//! Phase A walks the named dependency graph of the pending variables
//! forward from its leaves and draws whatever it can. Traversal order does
//! not follow data dependencies, so Phase A may leave requested variables
//! unresolved. Phase B then retries the requested variables round by round
//! until all of them are drawn or a round makes no progress.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use log::{debug, trace};

use super::PosteriorPredictiveTrace;
use super::context::{DrawContext, ScopeMode};
use super::drawer::ValueDrawer;
use super::init::InitSplit;
use crate::error::PredictiveError;
use crate::model::{DependencyGraph, Model, NodeId};
use crate::runtime::Array;
use crate::util::timing::{ScopedTimer, measure_debug_lazy};

/// Drawn named nodes, by name.
type GivenMap = BTreeMap<String, (NodeId, Array)>;

/// Resolve every pending variable of `split`. Returns the values of all
/// requested variables keyed by request position.
pub fn resolve(
    drawer: &ValueDrawer<'_>,
    ctx: &mut DrawContext,
    vars: &[NodeId],
    split: InitSplit,
    result: &mut PosteriorPredictiveTrace,
) -> Result<BTreeMap<usize, Array>, PredictiveError> {
    let InitSplit {
        mut evaluated,
        pending,
    } = split;
    if pending.is_empty() {
        return Ok(evaluated);
    }

    let model = drawer.model();
    let size = drawer.size();
    let graph = measure_debug_lazy(
        || format!("graph discovery over {} root(s)", pending.len()),
        || DependencyGraph::for_roots(model, pending.iter().map(|&(_, id)| id)),
    )?;
    debug!(
        "dependency graph: {} named nodes, {} leaves",
        graph.len(),
        graph.leaves.len()
    );

    let mut ctx = ctx.enter(ScopeMode::Shared);
    let mut givens = GivenMap::new();
    for ((id, key_size), value) in ctx.drawn() {
        if *key_size != size {
            continue;
        }
        if let Some(name) = model.node(*id)?.name() {
            givens.insert(name.to_string(), (*id, value.clone()));
        }
    }

    let requested: HashSet<NodeId> = vars.iter().copied().collect();
    {
        let _timer = ScopedTimer::debug("phase A");
        forward_pass(drawer, &mut ctx, &graph, &requested, &mut givens, result)?;
    }

    let _timer = ScopedTimer::debug("phase B");
    let mut to_eval: BTreeSet<usize> = BTreeSet::new();
    let mut missing_inputs: BTreeSet<usize> = pending.iter().map(|&(index, _)| index).collect();
    let mut round = 0;
    while !to_eval.is_empty() || !missing_inputs.is_empty() {
        if to_eval == missing_inputs {
            let stuck = to_eval.iter().map(|&index| model.label(vars[index])).collect();
            return Err(PredictiveError::UnresolvableDependency(stuck));
        }
        round += 1;
        debug!("phase B round {}: {} to evaluate", round, missing_inputs.len());
        to_eval = std::mem::take(&mut missing_inputs);

        for &index in &to_eval {
            let id = vars[index];
            let key = (id, size);
            if let Some(value) = ctx.get(&key).cloned() {
                result.insert(model.label(id), value.clone());
                evaluated.insert(index, value);
                continue;
            }

            for child in graph.children_of(id) {
                let Some(name) = model.node(child)?.name() else {
                    continue;
                };
                if !givens.contains_key(name) {
                    if let Some(value) = ctx.get(&(child, size)) {
                        givens.insert(name.to_string(), (child, value.clone()));
                    }
                }
            }

            let all_givens: Vec<(NodeId, &Array)> =
                givens.values().map(|(given, value)| (*given, value)).collect();
            match drawer.draw_value(&mut ctx, id, &all_givens) {
                Ok(value) => {
                    let name = model.label(id);
                    ctx.insert(key, value.clone());
                    result.insert(name.clone(), value.clone());
                    evaluated.insert(index, value.clone());
                    givens.insert(name, (id, value));
                }
                Err(err) if err.is_missing_input() => {
                    trace!("deferring '{}': {}", model.label(id), err);
                    missing_inputs.insert(index);
                }
                Err(err) => return Err(err),
            }
        }
    }

    Ok(evaluated)
}

/// Phase A: FIFO walk from the graph leaves.
fn forward_pass(
    drawer: &ValueDrawer<'_>,
    ctx: &mut DrawContext,
    graph: &DependencyGraph,
    requested: &HashSet<NodeId>,
    givens: &mut GivenMap,
    result: &mut PosteriorPredictiveTrace,
) -> Result<(), PredictiveError> {
    let model = drawer.model();
    let size = drawer.size();
    let mut queue: VecDeque<NodeId> = graph.leaves.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        if ctx.contains(&(id, size)) {
            continue;
        }
        let node = model.node(id)?;

        if node.is_fast_drawable() {
            // Observed variables wrapping this value still need a draw.
            let observed = graph.parents_of(id).filter(|&parent| {
                !ctx.contains(&(parent, size)) && is_observed(model, parent)
            });
            enqueue(&mut queue, observed);
            continue;
        }

        let node_givens: Vec<(NodeId, &Array)> = givens
            .values()
            .filter(|(given, _)| graph.has_child(id, *given))
            .map(|(given, value)| (*given, value))
            .collect();
        match drawer.draw_value(ctx, id, &node_givens) {
            Ok(value) => {
                let name = model.label(id);
                trace!("phase A drew '{}'", name);
                ctx.insert((id, size), value.clone());
                if requested.contains(&id) {
                    result.insert(name.clone(), value.clone());
                }
                givens.insert(name, (id, value));
            }
            Err(err) if err.is_missing_input() => {
                trace!("'{}' waits on its inputs: {}", model.label(id), err);
                let parents = graph
                    .parents_of(id)
                    .filter(|&parent| !ctx.contains(&(parent, size)));
                enqueue(&mut queue, parents);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn is_observed(model: &Model, id: NodeId) -> bool {
    model.node(id).is_ok_and(|node| node.is_observed())
}

fn enqueue(queue: &mut VecDeque<NodeId>, nodes: impl Iterator<Item = NodeId>) {
    let nodes: Vec<NodeId> = nodes.collect();
    for id in nodes {
        if !queue.contains(&id) {
            queue.push_back(id);
        }
    }
}
