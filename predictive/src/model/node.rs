//! Node: a single entry in the model arena.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::op::Op;
use crate::runtime::Array;

/// Stable arena index of a node. Identity of a node is its index, so two
/// nodes with equal contents are still distinct cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A distribution reference: the sampler kind plus its parameter nodes.
///
/// Parameters are not graph inputs of the variable carrying the
/// distribution; they are evaluated against a trace point at draw time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub kind: String,
    pub params: Vec<NodeId>,
}

impl DistributionSpec {
    pub fn new(kind: impl Into<String>, params: impl Into<Vec<NodeId>>) -> Self {
        Self {
            kind: kind.into(),
            params: params.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Immutable numeric value.
    Constant { value: Array },
    /// Mutable data container; its current value is read at draw time.
    Shared { value: Array },
    /// Free random variable with a declared shape.
    Free {
        distribution: DistributionSpec,
        #[serde(default)]
        shape: Vec<usize>,
    },
    /// Random variable conditioned on a single observation node.
    Observed {
        distribution: DistributionSpec,
        observations: NodeId,
    },
    /// Random variable conditioned on several observation nodes.
    MultiObserved {
        distribution: DistributionSpec,
        observations: Vec<NodeId>,
        #[serde(default)]
        shape: Vec<usize>,
    },
    /// Derived expression registered with the model.
    Deterministic { op: Op, inputs: Vec<NodeId> },
    /// Anonymous (or informally named) derived expression.
    Expression { op: Op, inputs: Vec<NodeId> },
    /// Log-probability term. Contributes to the model density only.
    Potential { expr: NodeId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(name: Option<String>, kind: NodeKind) -> Self {
        Self { name, kind }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Constant { .. } => "Constant",
            NodeKind::Shared { .. } => "Shared",
            NodeKind::Free { .. } => "FreeRV",
            NodeKind::Observed { .. } => "ObservedRV",
            NodeKind::MultiObserved { .. } => "MultiObservedRV",
            NodeKind::Deterministic { .. } => "Deterministic",
            NodeKind::Expression { .. } => "Expression",
            NodeKind::Potential { .. } => "Potential",
        }
    }

    /// Constants and shared values: readable without any graph traversal.
    pub fn is_fast_drawable(&self) -> bool {
        matches!(self.kind, NodeKind::Constant { .. } | NodeKind::Shared { .. })
    }

    /// Variables owned by the model. All of them must be named.
    pub fn is_model_variable(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Free { .. }
                | NodeKind::Observed { .. }
                | NodeKind::MultiObserved { .. }
                | NodeKind::Deterministic { .. }
                | NodeKind::Potential { .. }
        )
    }

    pub fn is_observed(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Observed { .. } | NodeKind::MultiObserved { .. }
        )
    }

    /// Random variables, the only ones read back from a trace. Derived
    /// variables are recomputed even when the trace records them.
    pub fn is_traced_variable(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Free { .. } | NodeKind::Observed { .. } | NodeKind::MultiObserved { .. }
        )
    }

    pub fn distribution(&self) -> Option<&DistributionSpec> {
        match &self.kind {
            NodeKind::Free { distribution, .. }
            | NodeKind::Observed { distribution, .. }
            | NodeKind::MultiObserved { distribution, .. } => Some(distribution),
            _ => None,
        }
    }

    /// Nodes this node is computed from in the expression graph.
    pub fn graph_inputs(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Constant { .. } | NodeKind::Shared { .. } | NodeKind::Free { .. } => {
                Vec::new()
            }
            NodeKind::Observed { observations, .. } => vec![*observations],
            NodeKind::MultiObserved { observations, .. } => observations.clone(),
            NodeKind::Deterministic { inputs, .. } | NodeKind::Expression { inputs, .. } => {
                inputs.clone()
            }
            NodeKind::Potential { expr } => vec![*expr],
        }
    }

    /// Every node referenced by this one, including distribution parameters.
    pub fn references(&self) -> Vec<NodeId> {
        let mut refs = self.graph_inputs();
        if let Some(distribution) = self.distribution() {
            refs.extend(distribution.params.iter().copied());
        }
        refs
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "<unnamed {}>", self.kind_name()),
        }
    }
}
