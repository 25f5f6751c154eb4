//! # Value Type System
//!
//! The unified runtime scalar. Every input, regardless of its declared PMML
//! type, is stored as a 64-bit float plus a missing flag; string values map
//! to a stable numeric id through the intern table. This keeps every
//! comparison and arithmetic operation in the scoring hot path a plain `f64`
//! operation.

use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::{Result, ScoreError};

/// Declared data type of a field.
///
/// PMML `integer` and `float` collapse into `Double`: every numeric type is
/// evaluated as a double.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Double,
    Boolean,
}

impl DataType {
    /// Parse a PMML `dataType` attribute.
    pub fn from_name(name: &str) -> Result<DataType> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "integer" | "float" | "double" => Ok(DataType::Double),
            "boolean" => Ok(DataType::Boolean),
            other => Err(ScoreError::Parsing(format!(
                "unsupported datatype: {other}"
            ))),
        }
    }
}

/// Intern table mapping string values to dense numeric ids.
///
/// Written during load and, rarely, during scoring when a raw input string
/// was never seen before; the sharded map makes those insertions atomic. The
/// `string_hashing` knob replaces the table with a stable hash, removing the
/// shared state at the cost of collision risk.
#[derive(Debug)]
pub struct StringInterner {
    ids: DashMap<String, f64>,
    next_id: AtomicU64,
    hashing: bool,
}

impl StringInterner {
    pub fn new(hashing: bool) -> Self {
        StringInterner {
            ids: DashMap::new(),
            next_id: AtomicU64::new(0),
            hashing,
        }
    }

    /// Id for a string value, assigning the next free id on first sight.
    pub fn intern(&self, text: &str) -> f64 {
        if self.hashing {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            text.hash(&mut hasher);
            return hasher.finish() as f64;
        }

        if let Some(id) = self.ids.get(text) {
            return *id;
        }

        *self
            .ids
            .entry(text.to_string())
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed) as f64)
    }
}

/// One runtime value: a number and a missing flag.
///
/// Comparisons and arithmetic operate on the number slot. String equality is
/// therefore equality of interned ids - consistent, but only numeric fields
/// have a meaningful order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Value {
    pub number: f64,
    pub missing: bool,
    /// Original text of string values, kept for the regex built-ins.
    #[cfg(feature = "regex-support")]
    pub text: Option<String>,
}

impl Value {
    /// The canonical missing value.
    pub fn missing() -> Value {
        Value {
            missing: true,
            ..Value::default()
        }
    }

    pub fn number(number: f64) -> Value {
        Value {
            number,
            missing: false,
            #[cfg(feature = "regex-support")]
            text: None,
        }
    }

    pub fn boolean(value: bool) -> Value {
        Value::number(if value { 1.0 } else { 0.0 })
    }

    /// Build a value from raw text under a declared type. Numeric text that
    /// does not parse is a `Parsing` error, which the mining schema maps to
    /// the field's missing policy.
    pub fn from_text(text: &str, datatype: DataType, interner: &StringInterner) -> Result<Value> {
        match datatype {
            DataType::Boolean => Ok(Value::boolean(
                text.eq_ignore_ascii_case("true") || text == "1",
            )),
            DataType::Double => {
                let number: f64 = text.parse().map_err(|_| {
                    ScoreError::Parsing(format!("{text} cannot be converted to a number"))
                })?;
                Ok(Value::number(number))
            }
            DataType::String => Ok(Value::string(text, interner)),
        }
    }

    /// An interned string value.
    pub fn string(text: &str, interner: &StringInterner) -> Value {
        let value = Value::number(interner.intern(text));
        #[cfg(feature = "regex-support")]
        let value = Value {
            text: Some(text.to_string()),
            ..value
        };
        value
    }

    /// Build a value from raw text, inferring the type: integral text within
    /// int range is numeric, as is fractional text; everything else is an
    /// interned string.
    pub fn infer(text: &str, interner: &StringInterner) -> Value {
        match text.parse::<f64>() {
            Ok(number) if number > f64::from(i32::MIN) && number < f64::from(i32::MAX) => {
                Value::number(number)
            }
            _ => Value::string(text, interner),
        }
    }

    /// Absolute difference.
    pub fn diff(&self, other: &Value) -> Value {
        Value::number((self.number - other.number).abs())
    }

    pub fn sum(values: &[Value]) -> Value {
        Value::number(values.iter().map(|value| value.number).sum())
    }

    pub fn avg(values: &[Value]) -> Value {
        Value::number(values.iter().map(|value| value.number).sum::<f64>() / values.len() as f64)
    }

    pub fn min(values: &[Value]) -> Value {
        Value::number(
            values
                .iter()
                .map(|value| value.number)
                .fold(f64::INFINITY, f64::min),
        )
    }

    pub fn max(values: &[Value]) -> Value {
        Value::number(
            values
                .iter()
                .map(|value| value.number)
                .fold(f64::NEG_INFINITY, f64::max),
        )
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        self.number.partial_cmp(&other.number)
    }
}

impl std::ops::Add for &Value {
    type Output = Value;
    fn add(self, other: &Value) -> Value {
        Value::number(self.number + other.number)
    }
}

impl std::ops::Sub for &Value {
    type Output = Value;
    fn sub(self, other: &Value) -> Value {
        Value::number(self.number - other.number)
    }
}

impl std::ops::Mul for &Value {
    type Output = Value;
    fn mul(self, other: &Value) -> Value {
        Value::number(self.number * other.number)
    }
}

impl std::ops::Div for &Value {
    type Output = Value;
    fn div(self, other: &Value) -> Value {
        Value::number(self.number / other.number)
    }
}

/// Set/map key over a value's number slot. Equality and hashing use the bit
/// pattern; ordering uses the IEEE total order, which agrees with it.
#[derive(Debug, Clone, Copy)]
pub struct ValueKey(f64);

impl ValueKey {
    pub fn new(number: f64) -> Self {
        ValueKey(number)
    }
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        ValueKey(value.number)
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for ValueKey {}

impl PartialOrd for ValueKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValueKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Membership set for set predicates. Small sets use an ordered set with
/// branch-predictable comparisons; sets past the configured threshold use a
/// hash set. Truth values are identical either way.
#[derive(Debug, Clone)]
pub enum ValueSet {
    Ordered(BTreeSet<ValueKey>),
    Hashed(HashSet<ValueKey>),
}

impl ValueSet {
    /// Build a membership set, picking the representation by `threshold`.
    pub fn from_values(values: &[Value], threshold: usize) -> ValueSet {
        if values.len() > threshold {
            ValueSet::Hashed(values.iter().map(ValueKey::from).collect())
        } else {
            ValueSet::Ordered(values.iter().map(ValueKey::from).collect())
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let key = ValueKey::from(value);
        match self {
            ValueSet::Ordered(set) => set.contains(&key),
            ValueSet::Hashed(set) => set.contains(&key),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueSet::Ordered(set) => set.len(),
            ValueSet::Hashed(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interner_assigns_stable_dense_ids() {
        let interner = StringInterner::new(false);
        let a = interner.intern("setosa");
        let b = interner.intern("versicolor");
        assert_ne!(a, b);
        assert_eq!(a, interner.intern("setosa"));
    }

    #[test]
    fn hashing_interner_is_deterministic() {
        let interner = StringInterner::new(true);
        assert_eq!(interner.intern("setosa"), interner.intern("setosa"));
        assert_ne!(interner.intern("setosa"), interner.intern("versicolor"));
    }

    #[test]
    fn datatype_collapses_numeric_kinds() {
        assert_eq!(DataType::from_name("integer").unwrap(), DataType::Double);
        assert_eq!(DataType::from_name("float").unwrap(), DataType::Double);
        assert_eq!(DataType::from_name("Double").unwrap(), DataType::Double);
        assert!(DataType::from_name("dateTime").is_err());
    }

    #[test]
    fn typed_construction() {
        let interner = StringInterner::new(false);
        assert_eq!(
            Value::from_text("2.5", DataType::Double, &interner)
                .unwrap()
                .number,
            2.5
        );
        assert_eq!(
            Value::from_text("true", DataType::Boolean, &interner)
                .unwrap()
                .number,
            1.0
        );
        assert!(Value::from_text("abc", DataType::Double, &interner).is_err());
    }

    #[test]
    fn inference_prefers_numbers_in_int_range() {
        let interner = StringInterner::new(false);
        assert_eq!(Value::infer("42", &interner).number, 42.0);
        assert_eq!(Value::infer("-1.5", &interner).number, -1.5);
        // out of int range falls back to string identity
        let big = Value::infer("1e300", &interner);
        let big_again = Value::infer("1e300", &interner);
        assert_eq!(big.number, big_again.number);
    }

    #[test]
    fn aggregates_return_true_extrema() {
        let values = vec![Value::number(3.0), Value::number(-1.0), Value::number(2.0)];
        assert_eq!(Value::min(&values).number, -1.0);
        assert_eq!(Value::max(&values).number, 3.0);
        assert_eq!(Value::sum(&values).number, 4.0);
        assert!((Value::avg(&values).number - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn set_representations_agree() {
        let values: Vec<Value> = (0..200).map(|i| Value::number(f64::from(i))).collect();
        let ordered = ValueSet::from_values(&values, 1000);
        let hashed = ValueSet::from_values(&values, 10);
        assert!(matches!(ordered, ValueSet::Ordered(_)));
        assert!(matches!(hashed, ValueSet::Hashed(_)));
        for probe in [-1.0, 0.0, 57.0, 199.0, 200.0] {
            assert_eq!(
                ordered.contains(&Value::number(probe)),
                hashed.contains(&Value::number(probe))
            );
        }
    }
}
