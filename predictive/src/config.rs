use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PredictiveError;

/// Settings for one posterior-predictive request.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct PredictiveConfig {
    /// Variables to sample. Empty means every observed variable of the model.
    #[serde(default)]
    pub vars: Vec<String>,
    /// Number of draws; defaults to the number of trace points.
    #[serde(default)]
    pub samples: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl PredictiveConfig {
    pub fn from_json(json: &str) -> Result<Self, PredictiveError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, PredictiveError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn with_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vars = vars.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn with_size(mut self, size: Option<usize>) -> Self {
        self.size = size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
