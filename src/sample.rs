//! Fixed-width sample buffer.
//!
//! One slot per indexed field, shared shape across every request against the
//! same loaded model. Evaluation starts from a clone of the model's base
//! sample (all slots missing) and never outlives the call.

use crate::error::{Result, ScoreError};
use crate::value::Value;

/// An indexed record holding one value per known field.
#[derive(Debug, Clone)]
pub struct Sample {
    values: Vec<Value>,
}

impl Sample {
    /// A sample of `size` slots, all missing.
    pub fn new(size: usize) -> Self {
        Sample {
            values: vec![Value::missing(); size],
        }
    }

    pub fn value(&self, index: usize) -> &Value {
        &self.values[index]
    }

    /// Value at `index`, failing with a missing-value error if the slot is
    /// missing. Simple predicates read through this.
    pub fn required(&self, index: usize) -> Result<&Value> {
        let value = &self.values[index];
        if value.missing {
            return Err(ScoreError::MissingValue(format!(
                "missing value in sample slot {index}"
            )));
        }
        Ok(value)
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// Write only if the slot is still missing.
    pub fn set_if_missing(&mut self, index: usize, value: Value) {
        if self.values[index].missing {
            self.values[index] = value;
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sample_is_all_missing() {
        let sample = Sample::new(3);
        assert!(sample.value(0).missing);
        assert!(sample.required(2).is_err());
    }

    #[test]
    fn set_if_missing_respects_present_values() {
        let mut sample = Sample::new(2);
        sample.set(0, Value::number(1.0));
        sample.set_if_missing(0, Value::number(9.0));
        sample.set_if_missing(1, Value::number(9.0));
        assert_eq!(sample.value(0).number, 1.0);
        assert_eq!(sample.value(1).number, 9.0);
    }
}
