use thiserror::Error;

use crate::model::NodeId;

#[derive(Error, Debug)]
pub enum PredictiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    /// A derived expression needs the value of a variable nobody has drawn yet.
    #[error("Missing input: no value available for '{0}'")]
    MissingInput(String),
    #[error("Cannot resolve inputs for {0:?}")]
    UnresolvableDependency(Vec<String>),
    #[error("Shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Unexpected type in draw_value: {0}")]
    UnsupportedNodeType(String),
    #[error("Internal consistency fault: {0}")]
    Inconsistent(String),
    #[error("Cannot broadcast shape {from:?} to {to:?}")]
    Broadcast { from: Vec<usize>, to: Vec<usize> },
    #[error("Invalid distribution parameter: {0}")]
    InvalidParameter(String),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Trace error: {0}")]
    Trace(String),
    #[error("Trace has no points to draw from")]
    EmptyTrace,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl PredictiveError {
    pub fn model(msg: impl Into<String>) -> Self {
        PredictiveError::Model(msg.into())
    }

    pub fn trace(msg: impl Into<String>) -> Self {
        PredictiveError::Trace(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        PredictiveError::InvalidArgument(msg.into())
    }

    /// Errors the scheduler recovers from by deferring the node.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, PredictiveError::MissingInput(_))
    }

    /// Errors raised when a distribution's assumed shape disagrees with the
    /// shapes its parameters currently evaluate to.
    pub fn is_shape_assumption(&self) -> bool {
        matches!(
            self,
            PredictiveError::Broadcast { .. } | PredictiveError::InvalidParameter(_)
        )
    }
}

pub type Result<T, E = PredictiveError> = std::result::Result<T, E>;
