//! Aggregation functions keyed by name.
//!
//! An aggregation reduces a node's weighted incoming values to a single
//! scalar before response, bias and activation are applied.

use std::collections::BTreeMap;

use crate::error::{NeatError, Result};
use crate::math;

/// Signature shared by every aggregation function.
pub type AggregationFn = fn(&[f32]) -> f32;

pub fn sum(values: &[f32]) -> f32 {
    values.iter().sum()
}

pub fn product(values: &[f32]) -> f32 {
    values.iter().product()
}

/// Largest value; 0 for no values.
pub fn max(values: &[f32]) -> f32 {
    values.iter().copied().reduce(f32::max).unwrap_or(0.0)
}

/// Smallest value; 0 for no values.
pub fn min(values: &[f32]) -> f32 {
    values.iter().copied().reduce(f32::min).unwrap_or(0.0)
}

/// Value with the largest magnitude, sign preserved.
pub fn maxabs(values: &[f32]) -> f32 {
    values
        .iter()
        .copied()
        .reduce(|a, b| if b.abs() > a.abs() { b } else { a })
        .unwrap_or(0.0)
}

/// Value with the smallest magnitude, sign preserved.
pub fn minabs(values: &[f32]) -> f32 {
    values
        .iter()
        .copied()
        .reduce(|a, b| if b.abs() < a.abs() { b } else { a })
        .unwrap_or(0.0)
}

pub fn mean(values: &[f32]) -> f32 {
    math::mean(values)
}

pub fn median(values: &[f32]) -> f32 {
    math::median(values)
}

/// Registry of aggregation functions by key.
#[derive(Debug, Clone)]
pub struct Aggregations {
    functions: BTreeMap<String, AggregationFn>,
}

impl Default for Aggregations {
    fn default() -> Self {
        let builtin: [(&str, AggregationFn); 8] = [
            ("sum", sum),
            ("product", product),
            ("max", max),
            ("min", min),
            ("maxabs", maxabs),
            ("minabs", minabs),
            ("mean", mean),
            ("median", median),
        ];
        Self {
            functions: builtin
                .into_iter()
                .map(|(name, f)| (name.to_string(), f))
                .collect(),
        }
    }
}

impl Aggregations {
    /// Look up the function registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnknownAggregation`] if the key is not registered.
    pub fn get(&self, name: &str) -> Result<AggregationFn> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| NeatError::UnknownAggregation(name.to_string()))
    }

    /// Register (or replace) a function under `name`.
    pub fn register(&mut self, name: impl Into<String>, function: AggregationFn) {
        self.functions.insert(name.into(), function);
    }

    #[must_use]
    pub fn is_valid(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered keys in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_functions() {
        let values = [-3.0, 1.0, 2.0];
        assert_eq!(sum(&values), 0.0);
        assert_eq!(product(&values), -6.0);
        assert_eq!(max(&values), 2.0);
        assert_eq!(min(&values), -3.0);
        assert_eq!(maxabs(&values), -3.0);
        assert_eq!(minabs(&values), 1.0);
        assert_eq!(mean(&values), 0.0);
        assert_eq!(median(&values), 1.0);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sum(&[]), 0.0);
        assert_eq!(product(&[]), 1.0);
        assert_eq!(max(&[]), 0.0);
        assert_eq!(minabs(&[]), 0.0);
    }

    #[test]
    fn test_registry() {
        let aggregations = Aggregations::default();
        assert_eq!(aggregations.names().count(), 8);
        let f = aggregations.get("maxabs").expect("builtin");
        assert_eq!(f(&[0.5, -0.7]), -0.7);
        assert!(matches!(
            aggregations.get("norm"),
            Err(NeatError::UnknownAggregation(_))
        ));
    }
}
