//! Built-in function registry.
//!
//! A fixed set of arithmetic, aggregation and predicate operators applied
//! positionally by `Apply` expressions. Each entry carries a fixed arity
//! (`None` for variadic); applying with the wrong arity is an invalid-value
//! error.

use crate::error::{Result, ScoreError};
use crate::value::{StringInterner, Value};

/// One built-in operator, keyed in the document by its lowercased name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFunction {
    Plus,
    Minus,
    Times,
    Divide,
    Max,
    Min,
    Sum,
    Avg,
    Exp,
    IsMissing,
    IsNotMissing,
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    IsIn,
    IsNotIn,
    #[cfg(feature = "regex-support")]
    Replace,
}

impl BuiltinFunction {
    pub fn from_name(name: &str) -> Result<BuiltinFunction> {
        match name.to_ascii_lowercase().as_str() {
            "+" => Ok(BuiltinFunction::Plus),
            "-" => Ok(BuiltinFunction::Minus),
            "*" => Ok(BuiltinFunction::Times),
            "/" => Ok(BuiltinFunction::Divide),
            "max" => Ok(BuiltinFunction::Max),
            "min" => Ok(BuiltinFunction::Min),
            "sum" => Ok(BuiltinFunction::Sum),
            "avg" => Ok(BuiltinFunction::Avg),
            "exp" => Ok(BuiltinFunction::Exp),
            "ismissing" => Ok(BuiltinFunction::IsMissing),
            "isnotmissing" => Ok(BuiltinFunction::IsNotMissing),
            "equal" => Ok(BuiltinFunction::Equal),
            "notequal" => Ok(BuiltinFunction::NotEqual),
            "lessthan" => Ok(BuiltinFunction::LessThan),
            "lessorequal" => Ok(BuiltinFunction::LessOrEqual),
            "greaterthan" => Ok(BuiltinFunction::GreaterThan),
            "greaterorequal" => Ok(BuiltinFunction::GreaterOrEqual),
            "isin" => Ok(BuiltinFunction::IsIn),
            "isnotin" => Ok(BuiltinFunction::IsNotIn),
            #[cfg(feature = "regex-support")]
            "replace" => Ok(BuiltinFunction::Replace),
            other => Err(ScoreError::Parsing(format!(
                "unsupported built-in function: {other}"
            ))),
        }
    }

    /// Fixed argument count, `None` for variadic entries.
    pub fn arity(&self) -> Option<usize> {
        match self {
            BuiltinFunction::Plus
            | BuiltinFunction::Minus
            | BuiltinFunction::Times
            | BuiltinFunction::Divide
            | BuiltinFunction::Equal
            | BuiltinFunction::NotEqual
            | BuiltinFunction::LessThan
            | BuiltinFunction::LessOrEqual
            | BuiltinFunction::GreaterThan
            | BuiltinFunction::GreaterOrEqual => Some(2),
            BuiltinFunction::Exp | BuiltinFunction::IsMissing | BuiltinFunction::IsNotMissing => {
                Some(1)
            }
            BuiltinFunction::Max
            | BuiltinFunction::Min
            | BuiltinFunction::Sum
            | BuiltinFunction::Avg
            | BuiltinFunction::IsIn
            | BuiltinFunction::IsNotIn => None,
            #[cfg(feature = "regex-support")]
            BuiltinFunction::Replace => Some(3),
        }
    }

    /// Apply to positional arguments.
    #[allow(unused_variables)]
    pub fn apply(&self, input: &[Value], interner: &StringInterner) -> Result<Value> {
        match self.arity() {
            Some(expected) if input.len() != expected => {
                return Err(ScoreError::InvalidValue(format!(
                    "wrong number of inputs for built-in function: got {}, expected {expected}",
                    input.len()
                )));
            }
            None if input.is_empty() => {
                return Err(ScoreError::InvalidValue(
                    "built-in function applied to no inputs".to_string(),
                ));
            }
            _ => {}
        }

        Ok(match self {
            BuiltinFunction::Plus => &input[0] + &input[1],
            BuiltinFunction::Minus => &input[0] - &input[1],
            BuiltinFunction::Times => &input[0] * &input[1],
            BuiltinFunction::Divide => &input[0] / &input[1],
            BuiltinFunction::Max => Value::max(input),
            BuiltinFunction::Min => Value::min(input),
            BuiltinFunction::Sum => Value::sum(input),
            BuiltinFunction::Avg => Value::avg(input),
            BuiltinFunction::Exp => Value::number(input[0].number.exp()),
            BuiltinFunction::IsMissing => Value::boolean(input[0].missing),
            BuiltinFunction::IsNotMissing => Value::boolean(!input[0].missing),
            BuiltinFunction::Equal => Value::boolean(input[0].number == input[1].number),
            BuiltinFunction::NotEqual => Value::boolean(input[0].number != input[1].number),
            BuiltinFunction::LessThan => Value::boolean(input[0].number < input[1].number),
            BuiltinFunction::LessOrEqual => Value::boolean(input[0].number <= input[1].number),
            BuiltinFunction::GreaterThan => Value::boolean(input[0].number > input[1].number),
            BuiltinFunction::GreaterOrEqual => Value::boolean(input[0].number >= input[1].number),
            BuiltinFunction::IsIn => Value::boolean(
                input[1..]
                    .iter()
                    .any(|member| member.number == input[0].number),
            ),
            BuiltinFunction::IsNotIn => Value::boolean(
                !input[1..]
                    .iter()
                    .any(|member| member.number == input[0].number),
            ),
            #[cfg(feature = "regex-support")]
            BuiltinFunction::Replace => {
                let text = input[0].text.as_deref().unwrap_or_default();
                let pattern = input[1].text.as_deref().unwrap_or_default();
                let replacement = input[2].text.as_deref().unwrap_or_default();
                let regex = regex::Regex::new(pattern).map_err(|error| {
                    ScoreError::InvalidValue(format!("invalid replace pattern: {error}"))
                })?;
                let replaced = regex.replace_all(text, replacement).into_owned();
                Value::string(&replaced, interner)
            }
        })
    }
}
