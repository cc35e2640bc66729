//! Initialization pass: settle every requested variable that needs no graph
//! resolution and queue the rest.

use std::collections::BTreeMap;

use log::{debug, trace};

use super::context::{DrawContext, ScopeMode};
use super::drawer::ValueDrawer;
use super::{PosteriorPredictiveTrace, requested_name};
use crate::error::PredictiveError;
use crate::model::NodeId;
use crate::runtime::Array;

#[derive(Debug, Default)]
pub struct InitSplit {
    /// Values already known, keyed by position in the request.
    pub evaluated: BTreeMap<usize, Array>,
    /// Variables left for the scheduler, in request order.
    pub pending: Vec<(usize, NodeId)>,
}

pub fn initialize(
    drawer: &ValueDrawer<'_>,
    ctx: &mut DrawContext,
    vars: &[NodeId],
    result: &mut PosteriorPredictiveTrace,
) -> Result<InitSplit, PredictiveError> {
    let model = drawer.model();
    let mut split = InitSplit::default();
    let mut ctx = ctx.enter(ScopeMode::Shared);

    for (index, &id) in vars.iter().enumerate() {
        let node = model.node(id)?;
        let name = requested_name(model, id)?;
        let key = (id, drawer.size());

        if node.is_fast_drawable() {
            let value = if let Some(cached) = ctx.get(&key).cloned() {
                cached
            } else {
                let value = drawer.draw_value(&mut ctx, id, &[])?;
                ctx.insert(key, value.clone());
                value
            };
            trace!("'{}' is fast drawable", name);
            result.insert(name.to_string(), value.clone());
            split.evaluated.insert(index, value);
        } else if let Some(value) = ctx.get(&key).cloned() {
            result.insert(name.to_string(), value.clone());
            split.evaluated.insert(index, value);
        } else if node.is_traced_variable() && drawer.trace().contains(name) {
            let value = drawer.trace().cycled(name, drawer.samples())?;
            trace!("'{}' read from trace", name);
            ctx.insert(key, value.clone());
            result.insert(name.to_string(), value.clone());
            split.evaluated.insert(index, value);
        } else {
            split.pending.push((index, id));
        }
    }

    debug!(
        "init pass: {} evaluated, {} pending",
        split.evaluated.len(),
        split.pending.len()
    );
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DistributionSpec, Model, Op, SamplerRegistry};
    use crate::trace::{Point, Trace};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn splits_requested_variables() {
        let mut model = Model::new();
        let zero = model.constant(Array::scalar(0.0));
        let one = model.constant(Array::scalar(1.0));
        let data = model.shared("data", Array::from_vec(vec![1.0, 2.0])).unwrap();
        let mu = model
            .free("mu", DistributionSpec::new("normal", [zero, one]), vec![])
            .unwrap();
        let y = model
            .observed("y", DistributionSpec::new("normal", [mu, one]), data)
            .unwrap();
        let mean = model.deterministic("mean", Op::Mean, vec![data]).unwrap();

        let trace = Trace::new(vec![
            Point::new().with("mu", Array::scalar(0.5)),
            Point::new().with("mu", Array::scalar(1.5)),
        ]);
        let samplers = SamplerRegistry::with_builtin_samplers();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 3, None);
        let mut ctx = DrawContext::new(StdRng::seed_from_u64(3));
        let mut result = PosteriorPredictiveTrace::new();

        let split = initialize(&drawer, &mut ctx, &[y, data, mu, mean], &mut result).unwrap();

        assert_eq!(split.pending, vec![(0, y), (3, mean)]);
        assert_eq!(split.evaluated[&1].data(), &[1.0, 2.0]);
        assert_eq!(split.evaluated[&2].data(), &[0.5, 1.5, 0.5]);
        assert!(ctx.contains(&(mu, None)));
        assert!(ctx.contains(&(data, None)));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn repeated_constants_reuse_the_cached_value() {
        let mut model = Model::new();
        let c = model.named_constant("c", Array::scalar(4.0)).unwrap();
        let trace = Trace::new(vec![Point::new().with("a", Array::scalar(0.0))]);
        let samplers = SamplerRegistry::new();
        let drawer = ValueDrawer::new(&model, &trace, &samplers, 2, None);
        let mut ctx = DrawContext::new(StdRng::seed_from_u64(3));
        ctx.insert((c, None), Array::scalar(9.0));
        let mut result = PosteriorPredictiveTrace::new();

        let split = initialize(&drawer, &mut ctx, &[c, c], &mut result).unwrap();
        assert_eq!(split.evaluated[&0], Array::scalar(9.0));
        assert_eq!(split.evaluated[&1], Array::scalar(9.0));
        assert_eq!(ctx.len(), 1);
    }
}
