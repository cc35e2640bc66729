//! Trace of posterior samples, organised as a sequence of points.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PredictiveError;
use crate::runtime::Array;

/// One complete assignment of values to the sampled variables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Point(HashMap<String, Array>);

impl Point {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: Array) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: Array) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Array> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    varnames: Vec<String>,
    points: Vec<Point>,
}

#[derive(Deserialize)]
struct TraceFile {
    points: Vec<Point>,
}

impl Trace {
    /// Variable names are collected from the points in first-seen order.
    pub fn new(points: Vec<Point>) -> Self {
        let mut varnames: Vec<String> = Vec::new();
        for point in &points {
            let mut names: Vec<&str> = point.names().collect();
            names.sort_unstable();
            for name in names {
                if !varnames.iter().any(|v| v == name) {
                    varnames.push(name.to_string());
                }
            }
        }
        Self { varnames, points }
    }

    /// Concatenate several chains, chain by chain.
    pub fn from_chains(chains: Vec<Trace>) -> Self {
        Trace::new(chains.into_iter().flat_map(|chain| chain.points).collect())
    }

    pub fn from_json(json: &str) -> Result<Self, PredictiveError> {
        let file: TraceFile = serde_json::from_str(json)?;
        Ok(Trace::new(file.points))
    }

    pub fn from_path(path: &Path) -> Result<Self, PredictiveError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn varnames(&self) -> &[String] {
        &self.varnames
    }

    pub fn contains(&self, name: &str) -> bool {
        self.varnames.iter().any(|v| v == name)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// `samples` points, repeating the trace in order when it is shorter.
    pub fn cycle_points(
        &self,
        samples: usize,
    ) -> Result<impl Iterator<Item = &Point>, PredictiveError> {
        if self.points.is_empty() {
            return Err(PredictiveError::EmptyTrace);
        }
        Ok(self.points.iter().cycle().take(samples))
    }

    pub fn first_point(&self) -> Result<&Point, PredictiveError> {
        self.points.first().ok_or(PredictiveError::EmptyTrace)
    }

    /// All stored values of `name`, stacked to `(points,) + shape`.
    pub fn get(&self, name: &str) -> Result<Array, PredictiveError> {
        if self.points.is_empty() {
            return Err(PredictiveError::EmptyTrace);
        }
        let rows = self
            .points
            .iter()
            .enumerate()
            .map(|(i, point)| {
                point.get(name).cloned().ok_or_else(|| {
                    PredictiveError::trace(format!("Point {} has no value for '{}'", i, name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Array::stack(&rows)
    }

    /// Stored values of `name` as `samples` rows; row `i` comes from point `i mod len`.
    pub fn cycled(&self, name: &str, samples: usize) -> Result<Array, PredictiveError> {
        self.get(name)?.cycle_rows(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_of(values: &[f64]) -> Trace {
        Trace::new(
            values
                .iter()
                .map(|v| Point::new().with("a", Array::scalar(*v)))
                .collect(),
        )
    }

    #[test]
    fn cycling_reuses_points_in_order() {
        let trace = trace_of(&[1.0, 2.0, 3.0]);
        let drawn: Vec<f64> = trace
            .cycle_points(7)
            .unwrap()
            .map(|p| p.get("a").unwrap().as_scalar().unwrap())
            .collect();
        assert_eq!(drawn, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn cycled_values_match_points() {
        let trace = trace_of(&[1.0, 2.0]);
        let values = trace.cycled("a", 5).unwrap();
        assert_eq!(values.data(), &[1.0, 2.0, 1.0, 2.0, 1.0]);
        assert_eq!(trace.get("a").unwrap().shape(), &[2]);
    }

    #[test]
    fn empty_trace_cannot_be_cycled() {
        let trace = Trace::new(Vec::new());
        assert!(matches!(
            trace.cycle_points(3).err(),
            Some(PredictiveError::EmptyTrace)
        ));
    }

    #[test]
    fn chains_are_concatenated() {
        let trace = Trace::from_chains(vec![trace_of(&[1.0]), trace_of(&[2.0, 3.0])]);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.varnames(), &["a".to_string()]);
    }

    #[test]
    fn loads_from_json() {
        let trace =
            Trace::from_json(r#"{"points": [{"a": 1.0, "b": [1.0, 2.0]}, {"a": 2.0, "b": [3.0, 4.0]}]}"#)
                .unwrap();
        assert!(trace.contains("b"));
        assert_eq!(trace.get("b").unwrap().shape(), &[2, 2]);
    }
}
