//! Evaluation of nodes against a single trace point.
//!
//! Samplers are invoked "with a point as context": their parameter nodes are
//! evaluated with the point's values substituted for named variables. Any
//! random variable the point does not record is drawn ancestrally. Callers
//! enter a blocked scope per point so these single-draw values are memoised
//! for that point only.

use log::trace;

use super::context::DrawContext;
use crate::error::PredictiveError;
use crate::model::{DistributionSpec, Model, NodeId, NodeKind, Sampler, SamplerRegistry};
use crate::runtime::Array;
use crate::trace::Point;

/// `(1,)` is treated as a scalar shape.
pub fn normalize_shape(shape: &[usize]) -> Vec<usize> {
    if shape == [1] {
        Vec::new()
    } else {
        shape.to_vec()
    }
}

pub struct PointEvaluator<'a> {
    model: &'a Model,
    samplers: &'a SamplerRegistry,
    size: Option<usize>,
}

impl<'a> PointEvaluator<'a> {
    pub fn new(model: &'a Model, samplers: &'a SamplerRegistry, size: Option<usize>) -> Self {
        Self {
            model,
            samplers,
            size,
        }
    }

    pub fn evaluate(
        &self,
        ctx: &mut DrawContext,
        id: NodeId,
        point: &Point,
    ) -> Result<Array, PredictiveError> {
        let key = (id, self.size);
        if let Some(value) = ctx.get(&key) {
            return Ok(value.clone());
        }

        let node = self.model.node(id)?;
        let value = match &node.kind {
            NodeKind::Constant { value } | NodeKind::Shared { value } => return Ok(value.clone()),
            _ if node.is_traced_variable()
                && node.name().is_some_and(|name| point.contains(name)) =>
            {
                node.name()
                    .and_then(|name| point.get(name))
                    .cloned()
                    .ok_or_else(|| {
                        PredictiveError::trace(format!("Point lost value of '{}'", node))
                    })?
            }
            NodeKind::Free {
                distribution,
                shape,
            } => {
                let shape = normalize_shape(shape);
                self.draw(ctx, id, distribution, Some(shape.as_slice()), point)?
            }
            NodeKind::Observed {
                distribution,
                observations,
            } => {
                let data = self.evaluate(ctx, *observations, point)?;
                self.draw(ctx, id, distribution, Some(data.shape()), point)?
            }
            NodeKind::MultiObserved {
                distribution,
                shape,
                ..
            } => self.draw(ctx, id, distribution, Some(shape.as_slice()), point)?,
            NodeKind::Deterministic { op, inputs } | NodeKind::Expression { op, inputs } => {
                let args = inputs
                    .iter()
                    .map(|&input| self.evaluate(ctx, input, point))
                    .collect::<Result<Vec<_>, _>>()?;
                op.apply(&args)?
            }
            NodeKind::Potential { .. } => {
                return Err(PredictiveError::UnsupportedNodeType(format!(
                    "{} '{}'",
                    node.kind_name(),
                    node
                )));
            }
        };

        ctx.insert(key, value.clone());
        Ok(value)
    }

    /// Evaluate every parameter of `distribution` at `point`.
    pub fn params(
        &self,
        ctx: &mut DrawContext,
        distribution: &DistributionSpec,
        point: &Point,
    ) -> Result<Vec<Array>, PredictiveError> {
        distribution
            .params
            .iter()
            .map(|&param| self.evaluate(ctx, param, point))
            .collect()
    }

    /// One draw from `sampler` with its parameters taken at `point`.
    pub fn random(
        &self,
        ctx: &mut DrawContext,
        sampler: &dyn Sampler,
        distribution: &DistributionSpec,
        shape: Option<&[usize]>,
        point: &Point,
    ) -> Result<Array, PredictiveError> {
        let params = self.params(ctx, distribution, point)?;
        sampler.sample(&params, shape, ctx.rng())
    }

    fn draw(
        &self,
        ctx: &mut DrawContext,
        id: NodeId,
        distribution: &DistributionSpec,
        shape: Option<&[usize]>,
        point: &Point,
    ) -> Result<Array, PredictiveError> {
        let sampler = self.samplers.get(&distribution.kind).ok_or_else(|| {
            PredictiveError::model(format!(
                "No sampler for distribution '{}' of '{}'",
                distribution.kind,
                self.model.label(id)
            ))
        })?;
        trace!("ancestral draw of '{}' at point", self.model.label(id));
        self.random(ctx, sampler, distribution, shape, point)
    }
}
