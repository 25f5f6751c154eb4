//! # Expression Trees
//!
//! Computations producing a value from a sample: constants, field
//! references, piecewise-linear normalization, one-hot indicators, binning,
//! table lookup, and `Apply` over a built-in function. Derived fields and
//! transformed output fields own one expression each.

mod functions;
mod tree_table;

pub use functions::BuiltinFunction;
pub use tree_table::TreeTable;

use std::collections::BTreeSet;

use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::predicate::{interval_predicate, required_attribute, Predicate};
use crate::sample::Sample;
use crate::schema::{InvalidValueTreatment, OutlierTreatment};
use crate::value::{DataType, StringInterner, Value};
use crate::xml::Element;

/// Element names recognized as expressions.
const EXPRESSION_NAMES: &[&str] = &[
    "Constant",
    "FieldRef",
    "NormContinuous",
    "NormDiscrete",
    "Discretize",
    "MapValues",
    "Apply",
];

/// One expression: its shape, its declared output type, and the set of field
/// names it reads (used by the dependency orderings).
#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub output_type: DataType,
    pub inputs: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    /// Pre-parsed constant; type inferred when not declared.
    Constant { value: Value },
    /// Reference to another field, with an optional missing replacement.
    FieldRef {
        field: usize,
        map_missing_to: Option<Value>,
    },
    /// Piecewise-linear interpolation across (orig, norm) break-points.
    NormContinuous {
        field: usize,
        outliers: OutlierTreatment,
        orig: Vec<f64>,
        norm: Vec<f64>,
        map_missing_to: Option<Value>,
    },
    /// 1.0 when the input equals the declared category, else 0.0.
    NormDiscrete {
        field: usize,
        value: Value,
        map_missing_to: Option<Value>,
    },
    /// Binning across an ordered list of intervals.
    Discretize {
        field: usize,
        bins: Vec<(Predicate, Value)>,
        default_value: Option<Value>,
        map_missing_to: Option<Value>,
    },
    /// Inline-table lookup keyed by N input columns.
    MapValues {
        columns: Vec<usize>,
        table: TreeTable,
        default_value: Option<Value>,
        map_missing_to: Option<Value>,
    },
    /// Built-in function over sub-expression results.
    Apply {
        function: BuiltinFunction,
        arguments: Vec<Expression>,
        map_missing_to: Option<Value>,
        default_value: Option<Value>,
        invalid_treatment: InvalidValueTreatment,
    },
}

impl Expression {
    /// Whether `element` names an expression kind.
    pub fn is_expression_element(element: &Element) -> bool {
        EXPRESSION_NAMES.contains(&element.name())
    }

    /// First expression child of `element`.
    pub fn find_in<'e>(element: &'e Element) -> Option<&'e Element> {
        element.child_in(EXPRESSION_NAMES)
    }

    /// Evaluate against a sample.
    pub fn eval(&self, sample: &Sample, interner: &StringInterner) -> Result<Value> {
        match &self.kind {
            ExpressionKind::Constant { value } => Ok(value.clone()),
            ExpressionKind::FieldRef {
                field,
                map_missing_to,
            } => {
                let value = sample.value(*field);
                if value.missing {
                    Ok(map_missing_to.clone().unwrap_or_else(Value::missing))
                } else {
                    Ok(value.clone())
                }
            }
            ExpressionKind::NormContinuous {
                field,
                outliers,
                orig,
                norm,
                map_missing_to,
            } => {
                let input = sample.value(*field);
                if input.missing {
                    return Ok(map_missing_to.clone().unwrap_or_else(Value::missing));
                }
                let x = input.number;
                if x < orig[0] || x > orig[orig.len() - 1] {
                    match outliers {
                        OutlierTreatment::AsIs => {}
                        OutlierTreatment::AsMissingValues => {
                            return Ok(map_missing_to.clone().unwrap_or_else(Value::missing));
                        }
                        OutlierTreatment::AsExtremeValues => {
                            return Ok(Value::number(norm[norm.len() - 1]));
                        }
                    }
                }
                Ok(Value::number(interpolate(orig, norm, x)))
            }
            ExpressionKind::NormDiscrete {
                field,
                value,
                map_missing_to,
            } => {
                let input = sample.value(*field);
                if input.missing {
                    return Ok(map_missing_to.clone().unwrap_or_else(Value::missing));
                }
                Ok(Value::boolean(input.number == value.number))
            }
            ExpressionKind::Discretize {
                field,
                bins,
                default_value,
                map_missing_to,
            } => {
                if sample.value(*field).missing {
                    return Ok(map_missing_to.clone().unwrap_or_else(Value::missing));
                }
                for (interval, bin_value) in bins {
                    if interval.test(sample)? {
                        return Ok(bin_value.clone());
                    }
                }
                Ok(default_value.clone().unwrap_or_else(Value::missing))
            }
            ExpressionKind::MapValues {
                columns,
                table,
                default_value,
                map_missing_to,
            } => {
                let mut keys = Vec::with_capacity(columns.len());
                for &column in columns {
                    let value = sample.value(column);
                    if value.missing {
                        return Ok(map_missing_to.clone().unwrap_or_else(Value::missing));
                    }
                    keys.push(value.clone());
                }
                match table.get(&keys) {
                    Some(value) => Ok(value.clone()),
                    None => Ok(default_value
                        .clone()
                        .or_else(|| map_missing_to.clone())
                        .unwrap_or_else(Value::missing)),
                }
            }
            ExpressionKind::Apply {
                function,
                arguments,
                map_missing_to,
                default_value,
                invalid_treatment,
            } => {
                let mut input = Vec::with_capacity(arguments.len());
                let mut missing_input = false;
                for argument in arguments {
                    let value = argument.eval(sample, interner)?;
                    missing_input |= value.missing;
                    input.push(value);
                }

                // missing inputs are resolved before the function is applied
                if missing_input {
                    return Ok(map_missing_to
                        .clone()
                        .or_else(|| default_value.clone())
                        .unwrap_or_else(Value::missing));
                }

                match function.apply(&input, interner) {
                    Ok(value) => Ok(value),
                    Err(error) => match invalid_treatment {
                        InvalidValueTreatment::ReturnInvalid => {
                            Err(ScoreError::InvalidValue(format!(
                                "evaluating apply function: {error}"
                            )))
                        }
                        InvalidValueTreatment::AsMissing => Ok(map_missing_to
                            .clone()
                            .or_else(|| default_value.clone())
                            .unwrap_or_else(Value::missing)),
                        InvalidValueTreatment::AsIs => Ok(Value::missing()),
                    },
                }
            }
        }
    }
}

/// Interpolate `x` across the break-points. A value equal to a break-point
/// returns that break-point's norm exactly; values outside the span
/// extrapolate along the nearest segment.
fn interpolate(orig: &[f64], norm: &[f64], x: f64) -> f64 {
    for (position, &breakpoint) in orig.iter().enumerate() {
        if x == breakpoint {
            return norm[position];
        }
    }

    let mut segment = orig.len() - 2;
    for position in 0..orig.len() - 1 {
        if x < orig[position + 1] {
            segment = position;
            break;
        }
    }

    norm[segment]
        + (x - orig[segment]) / (orig[segment + 1] - orig[segment])
            * (norm[segment + 1] - norm[segment])
}

/// Builds expressions from document elements.
pub struct ExpressionBuilder<'a> {
    indexer: &'a mut FieldIndexer,
    interner: &'a StringInterner,
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(indexer: &'a mut FieldIndexer, interner: &'a StringInterner) -> Self {
        ExpressionBuilder { indexer, interner }
    }

    /// Build the expression rooted at `element`, producing `output_type`.
    pub fn build(&mut self, element: &Element, output_type: DataType) -> Result<Expression> {
        let map_missing_to = self.typed_attribute(element, "mapMissingTo", output_type)?;
        let default_value = self.typed_attribute(element, "defaultValue", output_type)?;
        let mut inputs = BTreeSet::new();

        let kind = match element.name() {
            "Constant" => {
                let value = match element.attribute("dataType") {
                    Some(name) => Value::from_text(
                        element.text(),
                        DataType::from_name(name)?,
                        self.interner,
                    )?,
                    // without a declared type the standard says: infer
                    None => Value::infer(element.text(), self.interner),
                };
                ExpressionKind::Constant { value }
            }
            "FieldRef" => {
                let name = required_attribute(element, "field")?;
                inputs.insert(name.to_string());
                ExpressionKind::FieldRef {
                    field: self.indexer.get_or_set(name),
                    map_missing_to,
                }
            }
            "NormContinuous" => {
                let name = required_attribute(element, "field")?;
                inputs.insert(name.to_string());
                let mut orig = Vec::new();
                let mut norm = Vec::new();
                for linear_norm in element.children("LinearNorm") {
                    orig.push(
                        linear_norm
                            .double_attribute("orig")
                            .ok_or_else(|| missing_norm_attribute("orig"))?,
                    );
                    norm.push(
                        linear_norm
                            .double_attribute("norm")
                            .ok_or_else(|| missing_norm_attribute("norm"))?,
                    );
                }
                if orig.len() < 2 {
                    return Err(ScoreError::Parsing(
                        "NormContinuous needs at least two LinearNorm break-points".to_string(),
                    ));
                }
                ExpressionKind::NormContinuous {
                    field: self.indexer.get_or_set(name),
                    outliers: OutlierTreatment::from_name(
                        element.attribute("outliers").unwrap_or_default(),
                    ),
                    orig,
                    norm,
                    map_missing_to,
                }
            }
            "NormDiscrete" => {
                let name = required_attribute(element, "field")?;
                inputs.insert(name.to_string());
                // NormDiscrete encodes string categories
                let value = Value::from_text(
                    required_attribute(element, "value")?,
                    DataType::String,
                    self.interner,
                )?;
                ExpressionKind::NormDiscrete {
                    field: self.indexer.get_or_set(name),
                    value,
                    map_missing_to,
                }
            }
            "Discretize" => {
                let name = required_attribute(element, "field")?;
                inputs.insert(name.to_string());
                // binning only makes sense on numeric fields
                let (field, datatype) = self.indexer.get_or_set_typed(name, DataType::Double);
                let mut bins = Vec::new();
                for bin in element.children("DiscretizeBin") {
                    let bin_value = Value::from_text(
                        required_attribute(bin, "binValue")?,
                        output_type,
                        self.interner,
                    )?;
                    let interval = bin.child("Interval").ok_or_else(|| {
                        ScoreError::Parsing("DiscretizeBin without Interval".to_string())
                    })?;
                    bins.push((
                        interval_predicate(interval, field, datatype, self.interner)?,
                        bin_value,
                    ));
                }
                ExpressionKind::Discretize {
                    field,
                    bins,
                    default_value,
                    map_missing_to,
                }
            }
            "MapValues" => {
                let out = required_attribute(element, "outputColumn")?;
                let mut columns = Vec::new();
                let mut column_names = Vec::new();
                for pair in element.children("FieldColumnPair") {
                    let field_name = required_attribute(pair, "field")?;
                    inputs.insert(field_name.to_string());
                    columns.push(self.indexer.get_or_set(field_name));
                    column_names.push(required_attribute(pair, "column")?.to_string());
                }

                let mut table = TreeTable::new();
                let inline = element.child("InlineTable").ok_or_else(|| {
                    ScoreError::Parsing("MapValues without InlineTable".to_string())
                })?;
                for row in inline.children("row") {
                    let mut keys = Vec::with_capacity(column_names.len());
                    for column in &column_names {
                        let cell = row.child(column).ok_or_else(|| {
                            ScoreError::Parsing(format!("table row is missing column {column}"))
                        })?;
                        // key cell types are inferred
                        keys.push(Value::infer(cell.text(), self.interner));
                    }
                    let output_cell = row.child(out).ok_or_else(|| {
                        ScoreError::Parsing(format!("table row is missing output column {out}"))
                    })?;
                    table.add(
                        &keys,
                        Value::from_text(output_cell.text(), output_type, self.interner)?,
                    );
                }
                ExpressionKind::MapValues {
                    columns,
                    table,
                    default_value,
                    map_missing_to,
                }
            }
            "Apply" => {
                let function =
                    BuiltinFunction::from_name(required_attribute(element, "function")?)?;
                let mut arguments = Vec::new();
                for child in element.all_children() {
                    let argument = self.build(child, output_type)?;
                    inputs.extend(argument.inputs.iter().cloned());
                    arguments.push(argument);
                }
                ExpressionKind::Apply {
                    function,
                    arguments,
                    map_missing_to,
                    default_value,
                    invalid_treatment: InvalidValueTreatment::from_name(
                        element.attribute("invalidValueTreatment").unwrap_or_default(),
                    ),
                }
            }
            other => {
                return Err(ScoreError::Parsing(format!(
                    "unsupported expression element: {other}"
                )))
            }
        };

        Ok(Expression {
            kind,
            output_type,
            inputs,
        })
    }

    fn typed_attribute(
        &self,
        element: &Element,
        name: &str,
        datatype: DataType,
    ) -> Result<Option<Value>> {
        element
            .attribute(name)
            .map(|text| Value::from_text(text, datatype, self.interner))
            .transpose()
    }
}

fn missing_norm_attribute(name: &str) -> ScoreError {
    ScoreError::Parsing(format!("LinearNorm is missing required attribute {name}"))
}
