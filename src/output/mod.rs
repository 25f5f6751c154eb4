//! Output dictionary.
//!
//! Declarative post-score fields: the predicted value itself, the
//! probability of a given class, or a custom transformed expression. Output
//! fields may reference each other through transformed expressions, so the
//! dictionary evaluates them in its own dependency order.

use std::collections::BTreeSet;

use crate::error::{Result, ScoreError};
use crate::expression::{Expression, ExpressionBuilder};
use crate::indexer::FieldIndexer;
use crate::model::InternalScore;
use crate::predicate::required_attribute;
use crate::sample::Sample;
use crate::schema::OpType;
use crate::target::format_number;
use crate::value::{DataType, StringInterner, Value};
use crate::xml::Element;

/// What an output field reports.
#[derive(Debug, Clone)]
pub enum OutputExpression {
    /// The raw prediction (also covers display values and pass-through).
    PredictedValue { target: usize },
    /// The probability of one target category.
    Probability { target_value: String },
    /// A custom expression over the augmented sample.
    TransformedValue { expression: Expression },
}

/// One declared post-score field.
#[derive(Debug, Clone)]
pub struct OutputField {
    pub name: String,
    pub optype: OpType,
    pub datatype: DataType,
    pub index: usize,
    expression: OutputExpression,
    /// Field names a transformed expression reads; drives the ordering.
    inputs: BTreeSet<String>,
}

impl OutputField {
    fn parse(
        element: &Element,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
        model_target: &str,
    ) -> Result<OutputField> {
        let name = required_attribute(element, "name")?.to_string();
        let optype = OpType::from_name(element.attribute("optype").unwrap_or_default());

        let datatype = match element.attribute("dataType") {
            Some(declared) => DataType::from_name(declared)?,
            None => indexer.type_of(model_target).map_err(|_| {
                ScoreError::Parsing(format!("impossible to determine datatype for output: {name}"))
            })?,
        };
        let (index, datatype) = indexer.get_or_set_typed(&name, datatype);

        let mut inputs = BTreeSet::new();
        let expression = match element.attribute("feature").unwrap_or("predictedValue") {
            "predictedValue" | "predictedDisplayValue" | "passValue" => {
                OutputExpression::PredictedValue {
                    target: indexer.get_or_set(model_target),
                }
            }
            "probability" => OutputExpression::Probability {
                target_value: required_attribute(element, "value")?.to_string(),
            },
            "transformedValue" => {
                let expression_element = Expression::find_in(element).ok_or_else(|| {
                    ScoreError::Parsing(format!("output field {name} has no expression"))
                })?;
                let expression =
                    ExpressionBuilder::new(indexer, interner).build(expression_element, datatype)?;
                inputs = expression.inputs.clone();
                OutputExpression::TransformedValue { expression }
            }
            other => {
                return Err(ScoreError::Parsing(format!(
                    "unsupported output feature: {other}"
                )))
            }
        };

        Ok(OutputField {
            name,
            optype,
            datatype,
            index,
            expression,
            inputs,
        })
    }

    /// Evaluate into the field's sample slot (without touching the score).
    /// Model chains use this to expose outputs to later segments.
    pub fn prepare(&self, sample: &mut Sample, interner: &StringInterner) -> Result<()> {
        let value = match &self.expression {
            OutputExpression::PredictedValue { target } => sample.value(*target).clone(),
            OutputExpression::Probability { .. } => Value::missing(),
            OutputExpression::TransformedValue { expression } => {
                expression.eval(sample, interner)?
            }
        };
        sample.set_if_missing(self.index, value);
        Ok(())
    }

    /// Evaluate into the score's output maps.
    pub fn add_output(
        &self,
        sample: &Sample,
        score: &mut InternalScore,
        interner: &StringInterner,
    ) -> Result<()> {
        match self.datatype {
            DataType::String => {
                let text = match &self.expression {
                    OutputExpression::PredictedValue { .. } => score.score.clone(),
                    OutputExpression::Probability { target_value } => format_number(
                        score
                            .probabilities
                            .get(target_value)
                            .copied()
                            .unwrap_or(0.0),
                    ),
                    OutputExpression::TransformedValue { expression } => {
                        transformed_text(expression, sample, interner)?
                    }
                };
                score.str_outputs.insert(self.name.clone(), text);
            }
            _ => {
                let number = match &self.expression {
                    OutputExpression::PredictedValue { .. } => score.double_score,
                    OutputExpression::Probability { target_value } => score
                        .probabilities
                        .get(target_value)
                        .copied()
                        .unwrap_or(0.0),
                    OutputExpression::TransformedValue { expression } => {
                        expression.eval(sample, interner)?.number
                    }
                };
                score.num_outputs.insert(self.name.clone(), number);
            }
        }
        Ok(())
    }
}

#[cfg(feature = "regex-support")]
fn transformed_text(
    expression: &Expression,
    sample: &Sample,
    interner: &StringInterner,
) -> Result<String> {
    let value = expression.eval(sample, interner)?;
    Ok(value
        .text
        .clone()
        .unwrap_or_else(|| format_number(value.number)))
}

#[cfg(not(feature = "regex-support"))]
fn transformed_text(
    expression: &Expression,
    sample: &Sample,
    interner: &StringInterner,
) -> Result<String> {
    Ok(format_number(expression.eval(sample, interner)?.number))
}

/// All declared output fields, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct OutputDictionary {
    fields: Vec<OutputField>,
}

impl OutputDictionary {
    /// Parse the `Output` element; absent outputs are the empty dictionary.
    pub fn parse(
        element: Option<&Element>,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
        model_target: &str,
    ) -> Result<OutputDictionary> {
        let Some(element) = element else {
            return Ok(OutputDictionary::default());
        };

        let mut fields = Vec::new();
        for field_element in element.children("OutputField") {
            fields.push(OutputField::parse(
                field_element,
                indexer,
                interner,
                model_target,
            )?);
        }

        Ok(OutputDictionary {
            fields: dependency_order(fields)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fill the sample slots of every output field, in dependency order.
    pub fn prepare(&self, sample: &mut Sample, interner: &StringInterner) -> Result<()> {
        for field in &self.fields {
            field.prepare(sample, interner)?;
        }
        Ok(())
    }

    /// Fill the score's output maps. Each field's sample slot is materialized
    /// first, so transformed fields can read the outputs they depend on.
    pub fn add_output(
        &self,
        sample: &mut Sample,
        score: &mut InternalScore,
        interner: &StringInterner,
    ) -> Result<()> {
        for field in &self.fields {
            field.prepare(sample, interner)?;
            field.add_output(sample, score, interner)?;
        }
        Ok(())
    }
}

/// Order output fields so that a transformed field reading another output
/// field is evaluated after it.
fn dependency_order(fields: Vec<OutputField>) -> Result<Vec<OutputField>> {
    let mut order: Vec<usize> = Vec::with_capacity(fields.len());
    let mut states = vec![0u8; fields.len()]; // 0 unvisited, 1 in progress, 2 done

    fn visit(
        position: usize,
        fields: &[OutputField],
        states: &mut [u8],
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match states[position] {
            2 => return Ok(()),
            1 => {
                return Err(ScoreError::Parsing(format!(
                    "output field {} participates in a dependency cycle",
                    fields[position].name
                )))
            }
            _ => {}
        }
        states[position] = 1;
        for input in &fields[position].inputs {
            if let Some(dependency) = fields.iter().position(|field| &field.name == input) {
                visit(dependency, fields, states, order)?;
            }
        }
        states[position] = 2;
        order.push(position);
        Ok(())
    }

    for position in 0..fields.len() {
        visit(position, &fields, &mut states, &mut order)?;
    }

    let mut slots: Vec<Option<OutputField>> = fields.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect())
}
