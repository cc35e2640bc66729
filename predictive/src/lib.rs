pub mod config;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod runtime;
pub mod trace;
pub mod util;

use std::path::Path;

use log::info;

pub use config::PredictiveConfig;
pub use error::PredictiveError;
pub use evaluation::{PosteriorPredictive, PosteriorPredictiveTrace, sample_posterior_predictive};
pub use model::{DistributionSpec, Model, Node, NodeId, NodeKind, Op, Sampler, SamplerRegistry};
pub use runtime::Array;
pub use trace::{Point, Trace};

const USAGE: &str = "usage: predictive <model.json> <trace.json> [config.json]";

/// Command-line entry point: loads a model, a trace and an optional config,
/// then prints the drawn values as JSON.
pub fn run(args: Vec<String>) -> Result<(), PredictiveError> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let (model_path, trace_path, config_path) = match args.as_slice() {
        [_, model, trace] => (model, trace, None),
        [_, model, trace, config] => (model, trace, Some(config)),
        _ => return Err(PredictiveError::invalid_argument(USAGE)),
    };

    let model = Model::from_path(Path::new(model_path))?;
    let trace = Trace::from_path(Path::new(trace_path))?;
    let config = match config_path {
        Some(path) => PredictiveConfig::from_path(Path::new(path))?,
        None => PredictiveConfig::default(),
    };
    info!(
        "Loaded model with {} node(s) and trace with {} point(s)",
        model.len(),
        trace.len()
    );

    let result = PosteriorPredictive::with_default_samplers()
        .with_config(config)
        .sample_named(&model, &trace)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
