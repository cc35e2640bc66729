//! Posterior-predictive draw resolution.
//!
//! A request runs the initialization pass over the requested variables,
//! then hands whatever is left to the resolution scheduler. Both share one
//! [`DrawContext`] that is created for the request and dropped with it.

pub mod compile;
pub mod context;
pub(crate) mod drawer;
pub(crate) mod init;
pub mod point;
pub(crate) mod scheduler;

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::PredictiveConfig;
use crate::error::PredictiveError;
use crate::model::{Model, NodeId, Sampler, SamplerRegistry};
use crate::runtime::Array;
use crate::trace::Trace;
use crate::util::timing::ScopedTimer;
use context::{DrawContext, ScopeMode};
use drawer::ValueDrawer;

/// Drawn values by variable name, each shaped `(samples,) + variable shape`.
pub type PosteriorPredictiveTrace = BTreeMap<String, Array>;

pub(crate) fn requested_name(model: &Model, id: NodeId) -> Result<&str, PredictiveError> {
    model.node(id)?.name().ok_or_else(|| {
        PredictiveError::invalid_argument(format!(
            "cannot sample {}: requested variables must be named",
            model.label(id)
        ))
    })
}

pub struct PosteriorPredictive {
    samplers: SamplerRegistry,
    config: PredictiveConfig,
}

impl PosteriorPredictive {
    pub fn new(samplers: SamplerRegistry) -> Self {
        Self {
            samplers,
            config: PredictiveConfig::default(),
        }
    }

    pub fn with_default_samplers() -> Self {
        Self::new(SamplerRegistry::with_builtin_samplers())
    }

    pub fn with_config(mut self, config: PredictiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(&mut self, kind: impl Into<String>, sampler: Box<dyn Sampler>) {
        self.samplers.register(kind, sampler);
    }

    pub fn config(&self) -> &PredictiveConfig {
        &self.config
    }

    pub fn samplers(&self) -> &SamplerRegistry {
        &self.samplers
    }

    /// Distribution kinds used by `model` that have no registered sampler.
    pub fn unregistered_kinds(&self, model: &Model) -> BTreeSet<String> {
        model
            .iter()
            .filter_map(|(_, node)| node.distribution())
            .filter(|distribution| !self.samplers.contains(&distribution.kind))
            .map(|distribution| distribution.kind.clone())
            .collect()
    }

    /// Sample `vars`, drawing `config.samples` values (or one per trace point).
    pub fn sample(
        &self,
        model: &Model,
        trace: &Trace,
        vars: &[NodeId],
    ) -> Result<PosteriorPredictiveTrace, PredictiveError> {
        let samples = self.config.samples.unwrap_or(trace.len());
        self.draw_values(model, trace, vars, samples, self.config.size)
    }

    /// Sample the variables named in the config, or every observed variable
    /// when the config names none.
    pub fn sample_named(
        &self,
        model: &Model,
        trace: &Trace,
    ) -> Result<PosteriorPredictiveTrace, PredictiveError> {
        let vars = if self.config.vars.is_empty() {
            model.observed_variables()
        } else {
            self.config
                .vars
                .iter()
                .map(|name| model.lookup(name))
                .collect::<Result<Vec<_>, _>>()?
        };
        self.sample(model, trace, &vars)
    }

    pub fn draw_values(
        &self,
        model: &Model,
        trace: &Trace,
        vars: &[NodeId],
        samples: usize,
        size: Option<usize>,
    ) -> Result<PosteriorPredictiveTrace, PredictiveError> {
        if let Some(size) = size {
            return Err(PredictiveError::NotImplemented(format!(
                "size={} is not yet supported for sample_posterior_predictive",
                size
            )));
        }
        if samples == 0 {
            return Err(PredictiveError::invalid_argument(
                "samples must be at least 1",
            ));
        }
        let expected = vars
            .iter()
            .map(|&id| requested_name(model, id).map(str::to_string))
            .collect::<Result<BTreeSet<_>, _>>()?;
        for kind in self.unregistered_kinds(model) {
            warn!(
                "No sampler registered for distribution '{}'; its variables can only be read from the trace",
                kind
            );
        }

        let _timer = ScopedTimer::debug_lazy(|| {
            format!(
                "posterior predictive draw of {} variable(s) x {} samples",
                vars.len(),
                samples
            )
        });
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ctx = DrawContext::new(rng);
        let drawer = ValueDrawer::new(model, trace, &self.samplers, samples, size);
        let mut result = PosteriorPredictiveTrace::new();

        let evaluated = {
            let mut scope = ctx.enter(ScopeMode::Shared);
            let split = init::initialize(&drawer, &mut scope, vars, &mut result)?;
            scheduler::resolve(&drawer, &mut scope, vars, split, &mut result)?
        };
        debug!(
            "resolved {} of {} requested variable(s), {} cached draw(s)",
            evaluated.len(),
            vars.len(),
            ctx.len()
        );

        let drawn: BTreeSet<String> = result.keys().cloned().collect();
        if drawn != expected || evaluated.len() != vars.len() {
            return Err(PredictiveError::Inconsistent(format!(
                "requested {:?} but drew {:?}",
                expected, drawn
            )));
        }
        Ok(result)
    }
}

impl Default for PosteriorPredictive {
    fn default() -> Self {
        Self::with_default_samplers()
    }
}

/// Draw `samples` posterior-predictive values of `vars` with the built-in
/// samplers.
pub fn sample_posterior_predictive(
    model: &Model,
    vars: &[NodeId],
    trace: &Trace,
    samples: usize,
    size: Option<usize>,
) -> Result<PosteriorPredictiveTrace, PredictiveError> {
    PosteriorPredictive::with_default_samplers().draw_values(model, trace, vars, samples, size)
}
