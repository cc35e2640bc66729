use serde::{Deserialize, Serialize};

use crate::error::PredictiveError;
use crate::runtime::Array;

/// Elementwise operations available to derived expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Maximum,
    Minimum,
    Neg,
    Exp,
    Log,
    Sqrt,
    Abs,
    Square,
    Sigmoid,
    /// Sum of all elements, producing a scalar.
    Sum,
    /// Mean of all elements, producing a scalar.
    Mean,
}

impl Op {
    pub fn arity(self) -> usize {
        match self {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow | Op::Maximum | Op::Minimum => 2,
            _ => 1,
        }
    }

    pub fn apply(self, args: &[Array]) -> Result<Array, PredictiveError> {
        if args.len() != self.arity() {
            return Err(PredictiveError::invalid_argument(format!(
                "{:?} takes {} argument(s), got {}",
                self,
                self.arity(),
                args.len()
            )));
        }
        let x = &args[0];
        match self {
            Op::Add => x.zip_with(&args[1], |a, b| a + b),
            Op::Sub => x.zip_with(&args[1], |a, b| a - b),
            Op::Mul => x.zip_with(&args[1], |a, b| a * b),
            Op::Div => x.zip_with(&args[1], |a, b| a / b),
            Op::Pow => x.zip_with(&args[1], f64::powf),
            Op::Maximum => x.zip_with(&args[1], f64::max),
            Op::Minimum => x.zip_with(&args[1], f64::min),
            Op::Neg => Ok(x.map(|v| -v)),
            Op::Exp => Ok(x.map(f64::exp)),
            Op::Log => Ok(x.map(f64::ln)),
            Op::Sqrt => Ok(x.map(f64::sqrt)),
            Op::Abs => Ok(x.map(f64::abs)),
            Op::Square => Ok(x.map(|v| v * v)),
            Op::Sigmoid => Ok(x.map(|v| 1.0 / (1.0 + (-v).exp()))),
            Op::Sum => Ok(Array::scalar(x.sum())),
            Op::Mean => Ok(Array::scalar(x.mean())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_ops_broadcast_scalars() {
        let x = Array::from_vec(vec![1.0, 2.0, 3.0]);
        let y = Op::Mul.apply(&[x, Array::scalar(2.0)]).unwrap();
        assert_eq!(y.data(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn reductions_produce_scalars() {
        let x = Array::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(Op::Mean.apply(&[x.clone()]).unwrap(), Array::scalar(2.0));
        assert_eq!(Op::Sum.apply(&[x]).unwrap(), Array::scalar(6.0));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let err = Op::Add.apply(&[Array::scalar(1.0)]).unwrap_err();
        assert!(matches!(err, PredictiveError::InvalidArgument(_)));
    }
}
