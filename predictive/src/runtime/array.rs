//! Dense row-major `f64` arrays with numpy-style broadcasting.
//!
//! Every value that flows through the draw engine is an `Array`: constants,
//! trace rows, sampler output and the stacked `(samples, ...)` results.

use serde::{Deserialize, Serialize};

use crate::error::PredictiveError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayRepr", into = "ArrayRepr")]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Accepted JSON forms: `1.5`, `[1.0, 2.0]` or `{"shape": [2, 1], "data": [1.0, 2.0]}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ArrayRepr {
    Scalar(f64),
    Flat(Vec<f64>),
    Full { shape: Vec<usize>, data: Vec<f64> },
}

impl TryFrom<ArrayRepr> for Array {
    type Error = PredictiveError;

    fn try_from(repr: ArrayRepr) -> Result<Self, Self::Error> {
        match repr {
            ArrayRepr::Scalar(v) => Ok(Array::scalar(v)),
            ArrayRepr::Flat(values) => Ok(Array::from_vec(values)),
            ArrayRepr::Full { shape, data } => Array::new(shape, data),
        }
    }
}

impl From<Array> for ArrayRepr {
    fn from(array: Array) -> Self {
        ArrayRepr::Full {
            shape: array.shape,
            data: array.data,
        }
    }
}

impl Array {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, PredictiveError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(PredictiveError::invalid_argument(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: values,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// The single element of a one-element array.
    pub fn as_scalar(&self) -> Option<f64> {
        match self.data.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    /// Extent of the leading axis. A 0-d array counts as a single row.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    pub fn row(&self, index: usize) -> Result<Array, PredictiveError> {
        if self.shape.is_empty() {
            return Ok(self.clone());
        }
        if index >= self.shape[0] {
            return Err(PredictiveError::invalid_argument(format!(
                "row {} out of bounds for shape {:?}",
                index, self.shape
            )));
        }
        let width: usize = self.shape[1..].iter().product();
        Ok(Array {
            shape: self.shape[1..].to_vec(),
            data: self.data[index * width..(index + 1) * width].to_vec(),
        })
    }

    /// Stack equally shaped arrays along a new leading axis.
    pub fn stack(rows: &[Array]) -> Result<Array, PredictiveError> {
        let first = rows
            .first()
            .ok_or_else(|| PredictiveError::invalid_argument("cannot stack zero arrays"))?;
        let mut data = Vec::with_capacity(first.len() * rows.len());
        for row in rows {
            if row.shape != first.shape {
                return Err(PredictiveError::invalid_argument(format!(
                    "cannot stack shape {:?} with {:?}",
                    row.shape, first.shape
                )));
            }
            data.extend_from_slice(&row.data);
        }
        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(rows.len());
        shape.extend_from_slice(&first.shape);
        Ok(Array { shape, data })
    }

    /// Replicate the whole array `n` times along a new leading axis.
    pub fn tile(&self, n: usize) -> Array {
        let mut shape = Vec::with_capacity(self.ndim() + 1);
        shape.push(n);
        shape.extend_from_slice(&self.shape);
        let mut data = Vec::with_capacity(self.len() * n);
        for _ in 0..n {
            data.extend_from_slice(&self.data);
        }
        Array { shape, data }
    }

    /// Take `n` rows, wrapping around the leading axis: row `i` is row `i mod rows`.
    pub fn cycle_rows(&self, n: usize) -> Result<Array, PredictiveError> {
        if self.shape.is_empty() {
            return Ok(self.tile(n));
        }
        if self.shape[0] == 0 {
            return Err(PredictiveError::invalid_argument(
                "cannot cycle the rows of an empty array",
            ));
        }
        if self.shape[0] == n {
            return Ok(self.clone());
        }
        let rows = (0..n)
            .map(|i| self.row(i % self.shape[0]))
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            let mut shape = self.shape.clone();
            shape[0] = 0;
            return Ok(Array {
                shape,
                data: Vec::new(),
            });
        }
        Array::stack(&rows)
    }

    pub fn atleast_1d(self) -> Array {
        if self.shape.is_empty() {
            Array {
                shape: vec![1],
                data: self.data,
            }
        } else {
            self
        }
    }

    pub fn broadcast_to(&self, target: &[usize]) -> Result<Array, PredictiveError> {
        if self.shape == target {
            return Ok(self.clone());
        }
        let incompatible = || PredictiveError::Broadcast {
            from: self.shape.clone(),
            to: target.to_vec(),
        };
        if self.shape.len() > target.len() {
            return Err(incompatible());
        }

        let offset = target.len() - self.shape.len();
        let source_strides = strides(&self.shape);
        let mut steps = vec![0usize; target.len()];
        for (axis, &dim) in self.shape.iter().enumerate() {
            if dim == target[axis + offset] {
                steps[axis + offset] = source_strides[axis];
            } else if dim != 1 {
                return Err(incompatible());
            }
        }

        let len: usize = target.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = vec![0usize; target.len()];
        for _ in 0..len {
            let position: usize = index.iter().zip(&steps).map(|(i, s)| i * s).sum();
            data.push(self.data[position]);
            for axis in (0..target.len()).rev() {
                index[axis] += 1;
                if index[axis] < target[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Ok(Array {
            shape: target.to_vec(),
            data,
        })
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Array {
        Array {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Elementwise binary operation after broadcasting both operands.
    pub fn zip_with(
        &self,
        other: &Array,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Array, PredictiveError> {
        let shape =
            broadcast_shapes(&self.shape, &other.shape).ok_or_else(|| PredictiveError::Broadcast {
                from: other.shape.clone(),
                to: self.shape.clone(),
            })?;
        let lhs = self.broadcast_to(&shape)?;
        let rhs = other.broadcast_to(&shape)?;
        Ok(Array {
            shape,
            data: lhs
                .data
                .iter()
                .zip(&rhs.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            f64::NAN
        } else {
            self.sum() / self.data.len() as f64
        }
    }
}

/// Numpy broadcasting of two shapes, `None` when they are incompatible.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![0usize; ndim];
    for axis in 0..ndim {
        let da = axis
            .checked_sub(ndim - a.len())
            .map(|i| a[i])
            .unwrap_or(1);
        let db = axis
            .checked_sub(ndim - b.len())
            .map(|i| b[i])
            .unwrap_or(1);
        shape[axis] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(shape)
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_row_against_column() {
        let column = Array::new(vec![2, 1], vec![1.0, 2.0]).unwrap();
        let row = Array::from_vec(vec![10.0, 20.0, 30.0]);
        let sum = column.zip_with(&row, |a, b| a + b).unwrap();
        assert_eq!(sum.shape(), &[2, 3]);
        assert_eq!(sum.data(), &[11.0, 21.0, 31.0, 12.0, 22.0, 32.0]);
    }

    #[test]
    fn broadcast_rejects_incompatible_shapes() {
        let a = Array::from_vec(vec![1.0, 2.0, 3.0]);
        let err = a.broadcast_to(&[2]).unwrap_err();
        assert!(matches!(err, PredictiveError::Broadcast { .. }));
        assert!(broadcast_shapes(&[3], &[4]).is_none());
        assert_eq!(broadcast_shapes(&[], &[4]), Some(vec![4]));
    }

    #[test]
    fn cycle_rows_wraps_around() {
        let a = Array::new(vec![3, 2], vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]).unwrap();
        let cycled = a.cycle_rows(5).unwrap();
        assert_eq!(cycled.shape(), &[5, 2]);
        assert_eq!(cycled.row(3).unwrap(), a.row(0).unwrap());
        assert_eq!(cycled.row(4).unwrap(), a.row(1).unwrap());
    }

    #[test]
    fn tile_replicates_value() {
        let tiled = Array::scalar(4.0).tile(3);
        assert_eq!(tiled.shape(), &[3]);
        assert_eq!(tiled.data(), &[4.0, 4.0, 4.0]);
    }

    #[test]
    fn stack_requires_matching_shapes() {
        let err = Array::stack(&[Array::scalar(1.0), Array::from_vec(vec![1.0])]).unwrap_err();
        assert!(matches!(err, PredictiveError::InvalidArgument(_)));
    }

    #[test]
    fn deserializes_all_json_forms() {
        let scalar: Array = serde_json::from_str("2.5").unwrap();
        assert!(scalar.is_scalar());
        let flat: Array = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(flat.shape(), &[2]);
        let full: Array = serde_json::from_str(r#"{"shape": [2, 1], "data": [1.0, 2.0]}"#).unwrap();
        assert_eq!(full.shape(), &[2, 1]);
        assert!(serde_json::from_str::<Array>(r#"{"shape": [3], "data": [1.0]}"#).is_err());
    }
}
