//! Value drawer: produces `samples` draws of a single node.
//!
//! Dispatch order:
//! 1. constants and shared values are returned as they are,
//! 2. random variables recorded in the trace are read from it,
//! 3. free random variables are sampled once per (cycled) trace point,
//! 4. observed variables are sampled at the shape of their observations,
//!    re-inferring the shape once if the parameters disagree with it,
//! 5. multi-observed variables are sampled at their declared shape,
//! 6. everything else is compiled and evaluated against the givens.
//!
//! Per-point draws see row `i` of every variable already drawn for the
//! request, so parameters stay consistent with the rest of the result.

use std::collections::HashSet;

use log::{trace, warn};

use super::compile::compile;
use super::context::{DrawContext, DrawKey, ScopeMode};
use super::point::{PointEvaluator, normalize_shape};
use crate::error::PredictiveError;
use crate::model::graph_analysis::ancestors;
use crate::model::{DistributionSpec, Model, NodeId, NodeKind, Sampler, SamplerRegistry};
use crate::runtime::Array;
use crate::trace::Trace;

/// Already drawn values available to derived expressions.
pub type Givens<'v> = [(NodeId, &'v Array)];

pub struct ValueDrawer<'a> {
    model: &'a Model,
    trace: &'a Trace,
    samplers: &'a SamplerRegistry,
    samples: usize,
    size: Option<usize>,
}

impl<'a> ValueDrawer<'a> {
    pub fn new(
        model: &'a Model,
        trace: &'a Trace,
        samplers: &'a SamplerRegistry,
        samples: usize,
        size: Option<usize>,
    ) -> Self {
        Self {
            model,
            trace,
            samplers,
            samples,
            size,
        }
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    pub fn trace(&self) -> &'a Trace {
        self.trace
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn draw_value(
        &self,
        ctx: &mut DrawContext,
        id: NodeId,
        givens: &Givens<'_>,
    ) -> Result<Array, PredictiveError> {
        let node = self.model.node(id)?;
        trace!("drawing '{}' ({})", node, node.kind_name());

        match &node.kind {
            NodeKind::Constant { value } | NodeKind::Shared { value } => return Ok(value.clone()),
            NodeKind::Potential { .. } => {
                return Err(PredictiveError::UnsupportedNodeType(format!(
                    "{} '{}'",
                    node.kind_name(),
                    node
                )));
            }
            _ => {}
        }

        if node.is_traced_variable() {
            if let Some(name) = node.name().filter(|name| self.trace.contains(name)) {
                return self.trace.cycled(name, self.samples);
            }
        }

        let sampler = node
            .distribution()
            .and_then(|distribution| self.samplers.get(&distribution.kind));
        match (&node.kind, sampler) {
            (NodeKind::Free { distribution, .. }, Some(sampler)) => {
                let shape = self.param_shape(id)?;
                self.draw_rows(ctx, id, sampler, distribution, &shape)
            }
            (NodeKind::Observed { distribution, .. }, Some(sampler)) => {
                self.draw_observed(ctx, id, sampler, distribution)
            }
            (NodeKind::MultiObserved { distribution, .. }, Some(sampler)) => {
                let shape = self.param_shape(id)?;
                self.draw_rows(ctx, id, sampler, distribution, &shape)
            }
            _ => self.draw_derived(id, givens),
        }
    }

    /// Shape of a single draw of `id`, with `(1,)` normalised to a scalar.
    pub fn param_shape(&self, id: NodeId) -> Result<Vec<usize>, PredictiveError> {
        let node = self.model.node(id)?;
        let shape = match &node.kind {
            NodeKind::Observed { observations, .. } => self.observation_shape(*observations)?,
            NodeKind::Free { shape, .. } | NodeKind::MultiObserved { shape, .. } => shape.clone(),
            NodeKind::Constant { value } | NodeKind::Shared { value } => value.shape().to_vec(),
            _ => compile(self.model, id, &[])?.call(&[])?.shape().to_vec(),
        };
        Ok(normalize_shape(&shape))
    }

    fn observation_shape(&self, observations: NodeId) -> Result<Vec<usize>, PredictiveError> {
        match &self.model.node(observations)?.kind {
            NodeKind::Constant { value } | NodeKind::Shared { value } => Ok(value.shape().to_vec()),
            _ => Ok(compile(self.model, observations, &[])?
                .call(&[])?
                .shape()
                .to_vec()),
        }
    }

    /// One draw per cycled trace point, stacked to `(samples,) + shape`.
    fn draw_rows(
        &self,
        ctx: &mut DrawContext,
        id: NodeId,
        sampler: &dyn Sampler,
        distribution: &DistributionSpec,
        shape: &[usize],
    ) -> Result<Array, PredictiveError> {
        let evaluator = PointEvaluator::new(self.model, self.samplers, self.size);
        let drawn = self.drawn_values(ctx)?;
        let mut rows = Vec::with_capacity(self.samples);
        for (i, point) in self.trace.cycle_points(self.samples)?.enumerate() {
            let mut scope = ctx.enter_row(&drawn, i)?;
            let row = evaluator.random(&mut scope, sampler, distribution, Some(shape), point)?;
            if row.shape() != shape {
                return Err(PredictiveError::ShapeMismatch {
                    name: self.model.label(id),
                    expected: shape.to_vec(),
                    actual: row.shape().to_vec(),
                });
            }
            rows.push(row);
        }
        stack_rows(rows, shape)
    }

    /// Sampled values already cached for this request. Fast-drawable
    /// entries are left out since they are not laid out by sample.
    fn drawn_values(&self, ctx: &DrawContext) -> Result<Vec<(DrawKey, Array)>, PredictiveError> {
        let mut drawn = Vec::new();
        for (key, value) in ctx.drawn() {
            if key.1 == self.size && !self.model.node(key.0)?.is_fast_drawable() {
                drawn.push((*key, value.clone()));
            }
        }
        Ok(drawn)
    }

    fn draw_observed(
        &self,
        ctx: &mut DrawContext,
        id: NodeId,
        sampler: &dyn Sampler,
        distribution: &DistributionSpec,
    ) -> Result<Array, PredictiveError> {
        let NodeKind::Observed { observations, .. } = &self.model.node(id)?.kind else {
            return Err(PredictiveError::Inconsistent(format!(
                "'{}' is not an observed variable",
                self.model.label(id)
            )));
        };
        let assumed = self.observation_shape(*observations)?;

        match self.draw_rows(ctx, id, sampler, distribution, &assumed) {
            Err(err) if err.is_shape_assumption() => {
                warn!(
                    "Parameters of '{}' disagree with observed shape {:?} ({}); re-inferring shape",
                    self.model.label(id),
                    assumed,
                    err
                );
                let inferred = self.explore_shape(ctx, sampler, distribution)?;
                self.draw_rows(ctx, id, sampler, distribution, &inferred)
            }
            result => result,
        }
    }

    /// Draw once without a shape assumption to learn the shape the current
    /// parameter values produce. The draw happens in an unseeded blocked
    /// scope.
    fn explore_shape(
        &self,
        ctx: &mut DrawContext,
        sampler: &dyn Sampler,
        distribution: &DistributionSpec,
    ) -> Result<Vec<usize>, PredictiveError> {
        let point = self.trace.first_point()?;
        let probe = {
            let mut blocked = ctx.enter(ScopeMode::Blocked);
            let evaluator = PointEvaluator::new(self.model, self.samplers, self.size);
            evaluator.random(&mut blocked, sampler, distribution, None, point)?
        }
        .atleast_1d();
        Ok(strip_size(probe.shape(), self.size))
    }

    /// Compile `id` over the givens it actually depends on and evaluate it
    /// once per sample.
    fn draw_derived(&self, id: NodeId, givens: &Givens<'_>) -> Result<Array, PredictiveError> {
        let blockers: HashSet<NodeId> = givens.iter().map(|(given, _)| *given).collect();
        let relevant = ancestors(self.model, id, &blockers)?;

        let mut inputs: Vec<(NodeId, &Array)> = Vec::new();
        for &(given, value) in givens {
            if relevant.contains(&given) && !self.model.node(given)?.is_fast_drawable() {
                inputs.push((given, value));
            }
        }
        let input_ids: Vec<NodeId> = inputs.iter().map(|(given, _)| *given).collect();
        let func = compile(self.model, id, &input_ids)?;

        if inputs.is_empty() {
            let output = func.call(&[])?;
            return Ok(output.tile(self.samples));
        }

        let mut rows = Vec::with_capacity(self.samples);
        for i in 0..self.samples {
            let args = inputs
                .iter()
                .map(|(_, value)| value.row(i % value.rows()))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(func.call(&args)?);
        }
        let row_shape = rows.first().map(|r| r.shape().to_vec()).unwrap_or_default();
        stack_rows(rows, &row_shape)
    }
}

fn stack_rows(rows: Vec<Array>, row_shape: &[usize]) -> Result<Array, PredictiveError> {
    if rows.is_empty() {
        let mut shape = vec![0];
        shape.extend_from_slice(row_shape);
        return Array::new(shape, Vec::new());
    }
    Array::stack(&rows)
}

/// Drop a leading `size` axis from a probed shape.
fn strip_size(shape: &[usize], size: Option<usize>) -> Vec<usize> {
    match size {
        Some(size) if shape.first() == Some(&size) => shape[1..].to_vec(),
        _ => shape.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Op;
    use crate::trace::Point;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn context() -> DrawContext {
        DrawContext::new(StdRng::seed_from_u64(11))
    }

    fn trace_of(name: &str, values: &[f64]) -> Trace {
        Trace::new(
            values
                .iter()
                .map(|v| Point::new().with(name, Array::scalar(*v)))
                .collect(),
        )
    }

    /// Always returns a 3-vector regardless of the requested shape.
    struct StubbornSampler;

    impl Sampler for StubbornSampler {
        fn arity(&self) -> usize {
            0
        }

        fn sample(
            &self,
            _params: &[Array],
            _shape: Option<&[usize]>,
            _rng: &mut StdRng,
        ) -> Result<Array, PredictiveError> {
            Ok(Array::from_vec(vec![0.0; 3]))
        }
    }

    #[test]
    fn free_variables_use_point_parameters() {
        let mut model = Model::new();
        let tiny = model.constant(Array::scalar(1e-9));
        let zero = model.constant(Array::scalar(0.0));
        let one = model.constant(Array::scalar(1.0));
        let mu = model
            .free("mu", DistributionSpec::new("normal", [zero, one]), vec![])
            .unwrap();
        let x = model
            .free("x", DistributionSpec::new("normal", [mu, tiny]), vec![1])
            .unwrap();

        let trace = trace_of("mu", &[10.0, 20.0, 30.0]);
        let samplers = SamplerRegistry::with_builtin_samplers();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 5, None);
        let mut ctx = context();
        let value = drawer.draw_value(&mut ctx, x, &[]).unwrap();

        assert_eq!(value.shape(), &[5]);
        for (i, expected) in [10.0, 20.0, 30.0, 10.0, 20.0].iter().enumerate() {
            assert!((value.data()[i] - expected).abs() < 1e-6);
        }
        assert!(ctx.is_empty());
    }

    #[test]
    fn sampler_returning_wrong_shape_is_a_mismatch() {
        let mut model = Model::new();
        let x = model
            .free("x", DistributionSpec::new("stubborn", Vec::<NodeId>::new()), vec![2])
            .unwrap();
        let trace = trace_of("other", &[0.0]);
        let mut samplers = SamplerRegistry::new();
        samplers.register("stubborn", Box::new(StubbornSampler));
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 2, None);

        let err = drawer.draw_value(&mut context(), x, &[]).unwrap_err();
        assert!(matches!(
            err,
            PredictiveError::ShapeMismatch { ref expected, ref actual, .. }
                if expected == &vec![2] && actual == &vec![3]
        ));
    }

    #[test]
    fn observed_shape_is_reinferred_from_parameters() {
        let mut model = Model::new();
        let x = model.shared("x", Array::from_vec(vec![1.0; 4])).unwrap();
        let data = model.shared("y_data", Array::from_vec(vec![0.0; 4])).unwrap();
        let tiny = model.constant(Array::scalar(1e-9));
        let slope = model
            .free("slope", DistributionSpec::new("normal", [tiny, tiny]), vec![])
            .unwrap();
        let mu = model.expr(Op::Mul, vec![slope, x]).unwrap();
        let y = model
            .observed("y", DistributionSpec::new("normal", [mu, tiny]), data)
            .unwrap();
        model.set_value(x, Array::from_vec(vec![1.0, 2.0])).unwrap();

        let trace = trace_of("slope", &[3.0, 5.0]);
        let samplers = SamplerRegistry::with_builtin_samplers();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 2, None);
        let mut ctx = context();
        let value = drawer.draw_value(&mut ctx, y, &[]).unwrap();

        assert_eq!(value.shape(), &[2, 2]);
        assert!((value.data()[3] - 10.0).abs() < 1e-6);
        assert!(ctx.is_empty());
    }

    #[test]
    fn derived_without_inputs_is_replicated() {
        let mut model = Model::new();
        let c = model.constant(Array::from_vec(vec![1.0, 4.0]));
        let root = model.named_expr("root", Op::Sqrt, vec![c]).unwrap();
        let trace = trace_of("a", &[0.0]);
        let samplers = SamplerRegistry::with_builtin_samplers();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 3, None);

        let value = drawer.draw_value(&mut context(), root, &[]).unwrap();
        assert_eq!(value.shape(), &[3, 2]);
        assert_eq!(value.data(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn derived_ignores_irrelevant_givens() {
        let mut model = Model::new();
        let zero = model.constant(Array::scalar(0.0));
        let one = model.constant(Array::scalar(1.0));
        let a = model
            .free("a", DistributionSpec::new("normal", [zero, one]), vec![])
            .unwrap();
        let b = model
            .free("b", DistributionSpec::new("normal", [zero, one]), vec![])
            .unwrap();
        let neg = model.deterministic("neg", Op::Neg, vec![a]).unwrap();
        let trace = trace_of("unrelated", &[0.0]);
        let samplers = SamplerRegistry::with_builtin_samplers();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 3, None);

        let a_values = Array::from_vec(vec![1.0, 2.0, 3.0]);
        let b_values = Array::from_vec(vec![7.0]);
        let value = drawer
            .draw_value(&mut context(), neg, &[(a, &a_values), (b, &b_values)])
            .unwrap();
        assert_eq!(value.data(), &[-1.0, -2.0, -3.0]);

        let err = drawer.draw_value(&mut context(), neg, &[(b, &b_values)]).unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn potentials_are_unsupported() {
        let mut model = Model::new();
        let c = model.constant(Array::scalar(1.0));
        let pot = model.potential("penalty", c).unwrap();
        let trace = trace_of("a", &[0.0]);
        let samplers = SamplerRegistry::with_builtin_samplers();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 1, None);

        let err = drawer.draw_value(&mut context(), pot, &[]).unwrap_err();
        assert!(matches!(err, PredictiveError::UnsupportedNodeType(ref msg) if msg.contains("Potential")));
    }

    #[test]
    fn strips_leading_size_axis() {
        assert_eq!(strip_size(&[4, 2], Some(4)), vec![2]);
        assert_eq!(strip_size(&[3, 2], Some(4)), vec![3, 2]);
        assert_eq!(strip_size(&[3], None), vec![3]);
    }
}
