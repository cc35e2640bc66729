//! Probabilistic model graph stored as an arena of nodes.
//!
//! Nodes are appended through the builder methods and can only reference
//! nodes that already exist, so the graph is acyclic by construction.

pub mod distribution;
pub mod graph_analysis;
pub mod node;
pub mod op;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use distribution::{Elementwise, Sampler, SamplerRegistry, register_builtin_samplers};
pub use graph_analysis::DependencyGraph;
pub use node::{DistributionSpec, Node, NodeId, NodeKind};
pub use op::Op;

use crate::error::PredictiveError;
use crate::runtime::Array;

#[derive(Debug, Clone, Default)]
pub struct Model {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
}

#[derive(Serialize, Deserialize)]
struct ModelFile {
    nodes: Vec<Node>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a model from a node list, validating names and references.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, PredictiveError> {
        let mut model = Model::new();
        for node in nodes {
            model.add(node)?;
        }
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self, PredictiveError> {
        let file: ModelFile = serde_json::from_str(json)?;
        Self::from_nodes(file.nodes)
    }

    pub fn from_path(path: &Path) -> Result<Self, PredictiveError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, PredictiveError> {
        let file = ModelFile {
            nodes: self.nodes.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, PredictiveError> {
        self.nodes.get(id.0).ok_or(PredictiveError::UnknownNode(id))
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn lookup(&self, name: &str) -> Result<NodeId, PredictiveError> {
        self.get(name)
            .ok_or_else(|| PredictiveError::model(format!("No variable named '{}'", name)))
    }

    /// Name of a node, or its id when unnamed. Used in error messages.
    pub fn label(&self, id: NodeId) -> String {
        match self.nodes.get(id.0).and_then(Node::name) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Observed and multi-observed variables in creation order.
    pub fn observed_variables(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.is_observed())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn constant(&mut self, value: Array) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(None, NodeKind::Constant { value }));
        id
    }

    pub fn named_constant(&mut self, name: &str, value: Array) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(Some(name.into()), NodeKind::Constant { value }))
    }

    /// A named data container whose value can be replaced with `set_value`.
    pub fn shared(&mut self, name: &str, value: Array) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(Some(name.into()), NodeKind::Shared { value }))
    }

    pub fn set_value(&mut self, id: NodeId, new_value: Array) -> Result<(), PredictiveError> {
        let label = self.label(id);
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Shared { value }) => {
                *value = new_value;
                Ok(())
            }
            Some(_) => Err(PredictiveError::model(format!(
                "'{}' is not a shared value",
                label
            ))),
            None => Err(PredictiveError::UnknownNode(id)),
        }
    }

    pub fn free(
        &mut self,
        name: &str,
        distribution: DistributionSpec,
        shape: Vec<usize>,
    ) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(
            Some(name.into()),
            NodeKind::Free {
                distribution,
                shape,
            },
        ))
    }

    pub fn observed(
        &mut self,
        name: &str,
        distribution: DistributionSpec,
        observations: NodeId,
    ) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(
            Some(name.into()),
            NodeKind::Observed {
                distribution,
                observations,
            },
        ))
    }

    pub fn multi_observed(
        &mut self,
        name: &str,
        distribution: DistributionSpec,
        observations: Vec<NodeId>,
        shape: Vec<usize>,
    ) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(
            Some(name.into()),
            NodeKind::MultiObserved {
                distribution,
                observations,
                shape,
            },
        ))
    }

    pub fn deterministic(
        &mut self,
        name: &str,
        op: Op,
        inputs: Vec<NodeId>,
    ) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(
            Some(name.into()),
            NodeKind::Deterministic { op, inputs },
        ))
    }

    pub fn expr(&mut self, op: Op, inputs: Vec<NodeId>) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(None, NodeKind::Expression { op, inputs }))
    }

    pub fn named_expr(
        &mut self,
        name: &str,
        op: Op,
        inputs: Vec<NodeId>,
    ) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(
            Some(name.into()),
            NodeKind::Expression { op, inputs },
        ))
    }

    pub fn potential(&mut self, name: &str, expr: NodeId) -> Result<NodeId, PredictiveError> {
        self.add(Node::new(Some(name.into()), NodeKind::Potential { expr }))
    }

    fn add(&mut self, node: Node) -> Result<NodeId, PredictiveError> {
        let id = NodeId(self.nodes.len());

        if node.is_model_variable() && node.name.is_none() {
            return Err(PredictiveError::model(format!(
                "{} variables must be named",
                node.kind_name()
            )));
        }
        if let Some(name) = &node.name {
            if self.names.contains_key(name) {
                return Err(PredictiveError::model(format!(
                    "Variable '{}' is already defined",
                    name
                )));
            }
        }
        if let Some(missing) = node.references().into_iter().find(|r| r.0 >= id.0) {
            return Err(PredictiveError::model(format!(
                "'{}' references {} which is not defined before it",
                node, missing
            )));
        }
        if let NodeKind::Deterministic { op, inputs } | NodeKind::Expression { op, inputs } =
            &node.kind
        {
            if inputs.len() != op.arity() {
                return Err(PredictiveError::model(format!(
                    "{:?} in '{}' takes {} input(s), got {}",
                    op,
                    node,
                    op.arity(),
                    inputs.len()
                )));
            }
        }

        if let Some(name) = &node.name {
            self.names.insert(name.clone(), id);
        }
        self.nodes.push(node);
        Ok(id)
    }
}
