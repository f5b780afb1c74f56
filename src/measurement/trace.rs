//! Named, append-only sample sequences produced by a scan.

use crate::error::{AppResult, DaqError};
use std::fmt;

/// An ordered sequence of numeric samples with a name.
///
/// Traces grow by [`append`](SignalTrace::append) during a scan. Elementwise
/// arithmetic between two traces requires equal lengths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalTrace {
    name: String,
    samples: Vec<f64>,
}

impl SignalTrace {
    /// Create an empty trace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    /// Create a trace from existing samples.
    pub fn with_samples(name: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }

    /// Trace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Samples in acquisition order.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample has been recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at `index`, if recorded.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.samples.get(index).copied()
    }

    /// Append one sample.
    pub fn append(&mut self, value: f64) {
        self.samples.push(value);
    }

    /// Append several samples.
    pub fn extend(&mut self, values: impl IntoIterator<Item = f64>) {
        self.samples.extend(values);
    }

    /// Drop every sample, keeping the name.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Elementwise sum, named `"a + b"`.
    pub fn try_add(&self, other: &SignalTrace) -> AppResult<SignalTrace> {
        self.combine(other, "+", |a, b| a + b)
    }

    /// Elementwise difference, named `"a - b"`.
    pub fn try_sub(&self, other: &SignalTrace) -> AppResult<SignalTrace> {
        self.combine(other, "-", |a, b| a - b)
    }

    /// Elementwise product, named `"a * b"`.
    pub fn try_mul(&self, other: &SignalTrace) -> AppResult<SignalTrace> {
        self.combine(other, "*", |a, b| a * b)
    }

    /// Elementwise quotient, named `"a / b"`. A zero divisor yields 0.
    pub fn try_div(&self, other: &SignalTrace) -> AppResult<SignalTrace> {
        self.combine(other, "/", |a, b| if b == 0.0 { 0.0 } else { a / b })
    }

    fn combine(
        &self,
        other: &SignalTrace,
        op: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> AppResult<SignalTrace> {
        if self.len() != other.len() {
            return Err(DaqError::Configuration(format!(
                "cannot combine traces '{}' ({} samples) and '{}' ({} samples)",
                self.name,
                self.len(),
                other.name,
                other.len()
            )));
        }
        let samples = self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(SignalTrace::with_samples(
            format!("{} {} {}", self.name, op, other.name),
            samples,
        ))
    }
}

impl fmt::Display for SignalTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} samples)", self.name, self.samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_traces_do_not_share_storage() {
        let mut a = SignalTrace::new("measured");
        let b = SignalTrace::new("measured");
        a.append(1.0);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn elementwise_ops_name_and_values() {
        let a = SignalTrace::with_samples("sig", vec![4.0, 6.0, 8.0]);
        let b = SignalTrace::with_samples("ref", vec![2.0, 0.0, 4.0]);

        let ratio = a.try_div(&b).unwrap();
        assert_eq!(ratio.name(), "sig / ref");
        assert_eq!(ratio.samples(), &[2.0, 0.0, 2.0]);

        assert_eq!(a.try_add(&b).unwrap().samples(), &[6.0, 6.0, 12.0]);
        assert_eq!(a.try_sub(&b).unwrap().samples(), &[2.0, 6.0, 4.0]);
        assert_eq!(a.try_mul(&b).unwrap().name(), "sig * ref");
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let a = SignalTrace::with_samples("a", vec![1.0, 2.0]);
        let b = SignalTrace::with_samples("b", vec![1.0]);
        assert!(matches!(a.try_add(&b), Err(DaqError::Configuration(_))));
    }

    #[test]
    fn extend_and_clear() {
        let mut t = SignalTrace::new("t");
        t.extend([1.0, 2.0]);
        t.append(3.0);
        assert_eq!(t.get(2), Some(3.0));
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.name(), "t");
    }
}
