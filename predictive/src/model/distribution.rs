//! Samplers: the random-drawing side of distributions.
//!
//! A distribution kind (`"normal"`, `"gamma"`, ...) is only drawable if a
//! `Sampler` is registered for it. Variables whose kind has no sampler are
//! treated as having no sampling capability by the draw engine.

use std::collections::HashMap;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use statrs::StatsError;
use statrs::distribution::{
    Bernoulli, Beta, Cauchy, Exp, Gamma, InverseGamma, LogNormal, Normal, Poisson, StudentsT,
    Uniform,
};

use crate::error::PredictiveError;
use crate::runtime::{Array, broadcast_shapes};

pub trait Sampler: Send + Sync {
    /// Number of parameter arrays the sampler expects.
    fn arity(&self) -> usize;

    /// Draw one value.
    ///
    /// With `shape` set, parameters are broadcast to exactly that shape and
    /// the result has that shape. Without it the result takes the common
    /// broadcast shape of the parameters.
    fn sample(
        &self,
        params: &[Array],
        shape: Option<&[usize]>,
        rng: &mut StdRng,
    ) -> Result<Array, PredictiveError>;
}

type ScalarDraw = dyn Fn(&[f64], &mut StdRng) -> Result<f64, StatsError> + Send + Sync;

/// Sampler drawing each element independently from scalar parameters.
pub struct Elementwise {
    kind: &'static str,
    arity: usize,
    draw: Box<ScalarDraw>,
}

impl Elementwise {
    pub fn new<F>(kind: &'static str, arity: usize, draw: F) -> Self
    where
        F: Fn(&[f64], &mut StdRng) -> Result<f64, StatsError> + Send + Sync + 'static,
    {
        Self {
            kind,
            arity,
            draw: Box::new(draw),
        }
    }
}

impl Sampler for Elementwise {
    fn arity(&self) -> usize {
        self.arity
    }

    fn sample(
        &self,
        params: &[Array],
        shape: Option<&[usize]>,
        rng: &mut StdRng,
    ) -> Result<Array, PredictiveError> {
        if params.len() != self.arity {
            return Err(PredictiveError::invalid_argument(format!(
                "{} expects {} parameter(s), got {}",
                self.kind,
                self.arity,
                params.len()
            )));
        }

        let target = match shape {
            Some(shape) => shape.to_vec(),
            None => params.iter().try_fold(Vec::new(), |acc, p| {
                broadcast_shapes(&acc, p.shape()).ok_or_else(|| PredictiveError::Broadcast {
                    from: p.shape().to_vec(),
                    to: acc.clone(),
                })
            })?,
        };
        let expanded = params
            .iter()
            .map(|p| p.broadcast_to(&target))
            .collect::<Result<Vec<_>, _>>()?;

        let len: usize = target.iter().product();
        let mut args = vec![0.0; self.arity];
        let mut data = Vec::with_capacity(len);
        for j in 0..len {
            for (arg, param) in args.iter_mut().zip(&expanded) {
                *arg = param.data()[j];
            }
            let value = (self.draw)(&args, rng).map_err(|e| {
                PredictiveError::InvalidParameter(format!("{}{:?}: {}", self.kind, args, e))
            })?;
            data.push(value);
        }
        Array::new(target, data)
    }
}

/// Convert the mean/standard-deviation parametrisation of an inverse gamma
/// into shape `alpha` and scale `beta`.
pub fn inverse_gamma_alpha_beta(mu: f64, sd: f64) -> (f64, f64) {
    let var = sd * sd;
    let alpha = (2.0 * var + mu * mu) / var;
    let beta = mu * (mu * mu + var) / var;
    (alpha, beta)
}

pub struct SamplerRegistry {
    samplers: HashMap<String, Box<dyn Sampler>>,
}

impl SamplerRegistry {
    pub fn new() -> Self {
        Self {
            samplers: HashMap::new(),
        }
    }

    pub fn with_builtin_samplers() -> Self {
        let mut registry = Self::new();
        register_builtin_samplers(&mut registry);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, sampler: Box<dyn Sampler>) {
        self.samplers.insert(kind.into(), sampler);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn Sampler> {
        self.samplers.get(kind).map(|s| s.as_ref())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.samplers.contains_key(kind)
    }
}

impl Default for SamplerRegistry {
    fn default() -> Self {
        Self::with_builtin_samplers()
    }
}

pub fn register_builtin_samplers(registry: &mut SamplerRegistry) {
    let builtins = [
        Elementwise::new("normal", 2, |p, rng| Ok(Normal::new(p[0], p[1])?.sample(rng))),
        Elementwise::new("half_normal", 1, |p, rng| {
            Ok(Normal::new(0.0, p[0])?.sample(rng).abs())
        }),
        Elementwise::new("uniform", 2, |p, rng| Ok(Uniform::new(p[0], p[1])?.sample(rng))),
        Elementwise::new("exponential", 1, |p, rng| Ok(Exp::new(p[0])?.sample(rng))),
        Elementwise::new("gamma", 2, |p, rng| Ok(Gamma::new(p[0], p[1])?.sample(rng))),
        Elementwise::new("inverse_gamma", 2, |p, rng| {
            Ok(InverseGamma::new(p[0], p[1])?.sample(rng))
        }),
        Elementwise::new("inverse_gamma_mu_sd", 2, |p, rng| {
            let (alpha, beta) = inverse_gamma_alpha_beta(p[0], p[1]);
            Ok(InverseGamma::new(alpha, beta)?.sample(rng))
        }),
        Elementwise::new("beta", 2, |p, rng| Ok(Beta::new(p[0], p[1])?.sample(rng))),
        Elementwise::new("bernoulli", 1, |p, rng| Ok(Bernoulli::new(p[0])?.sample(rng))),
        Elementwise::new("poisson", 1, |p, rng| Ok(Poisson::new(p[0])?.sample(rng))),
        Elementwise::new("student_t", 3, |p, rng| {
            Ok(StudentsT::new(p[1], p[2], p[0])?.sample(rng))
        }),
        Elementwise::new("lognormal", 2, |p, rng| Ok(LogNormal::new(p[0], p[1])?.sample(rng))),
        Elementwise::new("cauchy", 2, |p, rng| Ok(Cauchy::new(p[0], p[1])?.sample(rng))),
    ];
    for sampler in builtins {
        registry.register(sampler.kind, Box::new(sampler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn unknown_kinds_have_no_sampler() {
        let registry = SamplerRegistry::with_builtin_samplers();
        assert!(registry.get("wishart").is_none());
        assert!(!registry.contains("wishart"));
        assert!(registry.contains("normal"));
    }

    #[test]
    fn broadcasts_parameters_to_requested_shape() {
        let registry = SamplerRegistry::with_builtin_samplers();
        let normal = registry.get("normal").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mu = Array::from_vec(vec![0.0, 100.0, 200.0]);
        let draw = normal
            .sample(&[mu, Array::scalar(1e-6)], Some(&[2, 3]), &mut rng)
            .unwrap();
        assert_eq!(draw.shape(), &[2, 3]);
        assert!((draw.data()[4] - 100.0).abs() < 1e-3);
    }

    #[test]
    fn infers_shape_from_parameters_when_unset() {
        let registry = SamplerRegistry::with_builtin_samplers();
        let mut rng = StdRng::seed_from_u64(7);
        let lam = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let draw = registry
            .get("exponential")
            .unwrap()
            .sample(&[lam], None, &mut rng)
            .unwrap();
        assert_eq!(draw.shape(), &[4]);
        assert!(draw.data().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn incompatible_shape_assumption_is_a_broadcast_error() {
        let registry = SamplerRegistry::with_builtin_samplers();
        let mut rng = StdRng::seed_from_u64(7);
        let mu = Array::from_vec(vec![0.0; 5]);
        let err = registry
            .get("normal")
            .unwrap()
            .sample(&[mu, Array::scalar(1.0)], Some(&[10]), &mut rng)
            .unwrap_err();
        assert!(err.is_shape_assumption());
    }

    #[test]
    fn invalid_parameters_are_reported() {
        let registry = SamplerRegistry::with_builtin_samplers();
        let mut rng = StdRng::seed_from_u64(7);
        let err = registry
            .get("normal")
            .unwrap()
            .sample(&[Array::scalar(0.0), Array::scalar(-1.0)], None, &mut rng)
            .unwrap_err();
        assert!(matches!(err, PredictiveError::InvalidParameter(_)));
    }

    #[test]
    fn inverse_gamma_mu_sd_matches_closed_form() {
        let (alpha, beta) = inverse_gamma_alpha_beta(1.0, 0.5);
        assert!((alpha - 6.0).abs() < 1e-12);
        assert!((beta - 5.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_kind_has_no_sampler() {
        let registry = SamplerRegistry::with_builtin_samplers();
        assert!(registry.get("dirichlet").is_none());
        assert!(registry.contains("inverse_gamma"));
    }
}
