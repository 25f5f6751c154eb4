//! Predicate trees.
//!
//! Boolean conditions over a sample: simple comparisons, set membership, and
//! the AND/OR/XOR/SURROGATE combinators. Tree nodes branch on these, ensemble
//! segments gate on them, and data-field constraints are compiled into them.
//!
//! Evaluation contract: `test` returns the truth value, or a missing-value
//! error when a simple sub-predicate reads a missing slot. SURROGATE absorbs
//! missing-value errors from its children and returns the first concrete
//! boolean.

use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::sample::Sample;
use crate::value::{StringInterner, Value, ValueSet};
use crate::xml::Element;

/// Comparison operator of a simple predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl ComparisonOp {
    fn from_name(name: &str) -> Result<ComparisonOp> {
        match name.to_ascii_lowercase().as_str() {
            "equal" => Ok(ComparisonOp::Equal),
            "notequal" => Ok(ComparisonOp::NotEqual),
            "lessthan" => Ok(ComparisonOp::LessThan),
            "lessorequal" => Ok(ComparisonOp::LessOrEqual),
            "greaterthan" => Ok(ComparisonOp::GreaterThan),
            "greaterorequal" => Ok(ComparisonOp::GreaterOrEqual),
            other => Err(ScoreError::Parsing(format!(
                "unsupported predicate operator: {other}"
            ))),
        }
    }
}

/// Combinator of a compound predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Xor,
    Surrogate,
}

impl BooleanOp {
    fn from_name(name: &str) -> Result<BooleanOp> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Ok(BooleanOp::And),
            "or" => Ok(BooleanOp::Or),
            "xor" => Ok(BooleanOp::Xor),
            "surrogate" => Ok(BooleanOp::Surrogate),
            other => Err(ScoreError::Parsing(format!(
                "unsupported boolean operator: {other}"
            ))),
        }
    }
}

/// A boolean condition over a sample.
#[derive(Debug, Clone)]
pub enum Predicate {
    True,
    False,
    Simple {
        field: usize,
        op: ComparisonOp,
        value: Value,
    },
    SimpleSet {
        field: usize,
        negated: bool,
        set: ValueSet,
    },
    Compound {
        op: BooleanOp,
        children: Vec<Predicate>,
    },
}

impl Predicate {
    /// Evaluate against a sample.
    pub fn test(&self, sample: &Sample) -> Result<bool> {
        match self {
            Predicate::True => Ok(true),
            Predicate::False => Ok(false),
            Predicate::Simple { field, op, value } => {
                let input = sample.required(*field)?;
                Ok(match op {
                    ComparisonOp::Equal => input.number == value.number,
                    ComparisonOp::NotEqual => input.number != value.number,
                    ComparisonOp::LessThan => input.number < value.number,
                    ComparisonOp::LessOrEqual => input.number <= value.number,
                    ComparisonOp::GreaterThan => input.number > value.number,
                    ComparisonOp::GreaterOrEqual => input.number >= value.number,
                })
            }
            Predicate::SimpleSet {
                field,
                negated,
                set,
            } => {
                let input = sample.required(*field)?;
                Ok(set.contains(input) != *negated)
            }
            Predicate::Compound { op, children } => match op {
                BooleanOp::And => {
                    for child in children {
                        if !child.test(sample)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                BooleanOp::Or => {
                    for child in children {
                        if child.test(sample)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                BooleanOp::Xor => {
                    let first = children[0].test(sample)?;
                    for child in &children[1..] {
                        if child.test(sample)? != first {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                BooleanOp::Surrogate => {
                    for child in children {
                        match child.test(sample) {
                            Err(ScoreError::MissingValue(_)) => continue,
                            result => return result,
                        }
                    }
                    Err(ScoreError::MissingValue(
                        "all surrogate alternatives read missing values".to_string(),
                    ))
                }
            },
        }
    }
}

/// Builds predicates from document elements. Fields referenced by a predicate
/// must already have a slot in the indexer.
pub struct PredicateBuilder<'a> {
    indexer: &'a FieldIndexer,
    interner: &'a StringInterner,
    set_threshold: usize,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(
        indexer: &'a FieldIndexer,
        interner: &'a StringInterner,
        set_threshold: usize,
    ) -> Self {
        PredicateBuilder {
            indexer,
            interner,
            set_threshold,
        }
    }

    /// Build the predicate rooted at `element`; `None` is the always-true
    /// predicate.
    pub fn build(&self, element: Option<&Element>) -> Result<Predicate> {
        let Some(element) = element else {
            return Ok(Predicate::True);
        };

        match element.name() {
            "True" => Ok(Predicate::True),
            "False" => Ok(Predicate::False),
            "SimplePredicate" => {
                let (field, datatype) = self.field_slot(element)?;
                let op = ComparisonOp::from_name(required_attribute(element, "operator")?)?;
                let value =
                    Value::from_text(required_attribute(element, "value")?, datatype, self.interner)?;
                Ok(Predicate::Simple { field, op, value })
            }
            "SimpleSetPredicate" => {
                let (field, datatype) = self.field_slot(element)?;
                let negated = match required_attribute(element, "booleanOperator")? {
                    "isIn" => false,
                    "isNotIn" => true,
                    other => {
                        return Err(ScoreError::Parsing(format!(
                            "unsupported set operator: {other}"
                        )))
                    }
                };
                let array = element.child("Array").ok_or_else(|| {
                    ScoreError::Parsing("SimpleSetPredicate without Array".to_string())
                })?;
                let members = parse_array_items(array.text())
                    .iter()
                    .map(|item| Value::from_text(item, datatype, self.interner))
                    .collect::<Result<Vec<Value>>>()?;
                Ok(Predicate::SimpleSet {
                    field,
                    negated,
                    set: ValueSet::from_values(&members, self.set_threshold),
                })
            }
            "CompoundPredicate" => {
                let op = BooleanOp::from_name(required_attribute(element, "booleanOperator")?)?;
                let children = element
                    .all_children()
                    .map(|child| self.build(Some(child)))
                    .collect::<Result<Vec<Predicate>>>()?;
                if children.is_empty() {
                    return Err(ScoreError::Parsing(
                        "CompoundPredicate without children".to_string(),
                    ));
                }
                Ok(Predicate::Compound { op, children })
            }
            other => Err(ScoreError::Parsing(format!(
                "unsupported predicate element: {other}"
            ))),
        }
    }

    fn field_slot(&self, element: &Element) -> Result<(usize, crate::value::DataType)> {
        let name = required_attribute(element, "field")?;
        let field = self
            .indexer
            .index_of(name)
            .map_err(|_| ScoreError::Parsing(format!("predicate references unknown field: {name}")))?;
        let datatype = self
            .indexer
            .type_of(name)
            .map_err(|_| ScoreError::Parsing(format!("predicate field has no type: {name}")))?;
        Ok((field, datatype))
    }
}

/// Compile one `Interval` element into a range predicate over the field at
/// `index`. An absent margin leaves that side unbounded.
pub(crate) fn interval_predicate(
    element: &Element,
    index: usize,
    datatype: crate::value::DataType,
    interner: &StringInterner,
) -> Result<Predicate> {
    let closure = crate::schema::Closure::from_name(required_attribute(element, "closure")?)?;
    let (left_op, right_op) = match closure {
        crate::schema::Closure::ClosedClosed => {
            (ComparisonOp::GreaterOrEqual, ComparisonOp::LessOrEqual)
        }
        crate::schema::Closure::OpenOpen => (ComparisonOp::GreaterThan, ComparisonOp::LessThan),
        crate::schema::Closure::ClosedOpen => {
            (ComparisonOp::GreaterOrEqual, ComparisonOp::LessThan)
        }
        crate::schema::Closure::OpenClosed => {
            (ComparisonOp::GreaterThan, ComparisonOp::LessOrEqual)
        }
    };

    let mut bounds = Vec::new();
    if let Some(text) = element.attribute("leftMargin") {
        bounds.push(Predicate::Simple {
            field: index,
            op: left_op,
            value: Value::from_text(text, datatype, interner)?,
        });
    }
    if let Some(text) = element.attribute("rightMargin") {
        bounds.push(Predicate::Simple {
            field: index,
            op: right_op,
            value: Value::from_text(text, datatype, interner)?,
        });
    }

    Ok(Predicate::Compound {
        op: BooleanOp::And,
        children: bounds,
    })
}

pub(crate) fn required_attribute<'e>(element: &'e Element, name: &str) -> Result<&'e str> {
    element.attribute(name).ok_or_else(|| {
        ScoreError::Parsing(format!(
            "{} element is missing required attribute {name}",
            element.name()
        ))
    })
}

/// Split a PMML Array body into items, honoring double-quoted entries.
pub(crate) fn parse_array_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for character in text.chars() {
        match character {
            '"' => {
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    items.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        items.push(current);
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    fn setup() -> (FieldIndexer, StringInterner) {
        let mut indexer = FieldIndexer::new();
        indexer.get_or_set_typed("age", DataType::Double);
        indexer.get_or_set_typed("color", DataType::String);
        (indexer, StringInterner::new(false))
    }

    fn sample_with(indexer: &FieldIndexer, values: &[(usize, Value)]) -> Sample {
        let mut sample = Sample::new(indexer.len());
        for (index, value) in values {
            sample.set(*index, value.clone());
        }
        sample
    }

    #[test]
    fn simple_comparison() {
        let (indexer, interner) = setup();
        let builder = PredicateBuilder::new(&indexer, &interner, 150);
        let element = Element::parse(
            r#"<SimplePredicate field="age" operator="greaterThan" value="30"/>"#,
        )
        .unwrap();
        let predicate = builder.build(Some(&element)).unwrap();

        let sample = sample_with(&indexer, &[(0, Value::number(42.0))]);
        assert!(predicate.test(&sample).unwrap());
        let sample = sample_with(&indexer, &[(0, Value::number(30.0))]);
        assert!(!predicate.test(&sample).unwrap());
    }

    #[test]
    fn missing_field_raises() {
        let (indexer, interner) = setup();
        let builder = PredicateBuilder::new(&indexer, &interner, 150);
        let element =
            Element::parse(r#"<SimplePredicate field="age" operator="equal" value="1"/>"#).unwrap();
        let predicate = builder.build(Some(&element)).unwrap();

        let sample = Sample::new(indexer.len());
        assert!(matches!(
            predicate.test(&sample),
            Err(ScoreError::MissingValue(_))
        ));
    }

    #[test]
    fn set_membership_with_quoted_items() {
        let (indexer, interner) = setup();
        let builder = PredicateBuilder::new(&indexer, &interner, 150);
        let element = Element::parse(
            r#"<SimpleSetPredicate field="color" booleanOperator="isIn">
                 <Array n="2" type="string">"deep red" blue</Array>
               </SimpleSetPredicate>"#,
        )
        .unwrap();
        let predicate = builder.build(Some(&element)).unwrap();

        let hit = Value::from_text("deep red", DataType::String, &interner).unwrap();
        let miss = Value::from_text("green", DataType::String, &interner).unwrap();
        assert!(predicate
            .test(&sample_with(&indexer, &[(1, hit)]))
            .unwrap());
        assert!(!predicate
            .test(&sample_with(&indexer, &[(1, miss)]))
            .unwrap());
    }

    #[test]
    fn surrogate_skips_missing_children() {
        let (indexer, interner) = setup();
        let builder = PredicateBuilder::new(&indexer, &interner, 150);
        let element = Element::parse(
            r#"<CompoundPredicate booleanOperator="surrogate">
                 <SimplePredicate field="age" operator="greaterThan" value="30"/>
                 <True/>
               </CompoundPredicate>"#,
        )
        .unwrap();
        let predicate = builder.build(Some(&element)).unwrap();

        // age missing: the surrogate falls through to True
        let sample = Sample::new(indexer.len());
        assert!(predicate.test(&sample).unwrap());
    }

    #[test]
    fn surrogate_of_only_missing_children_raises() {
        let (indexer, interner) = setup();
        let builder = PredicateBuilder::new(&indexer, &interner, 150);
        let element = Element::parse(
            r#"<CompoundPredicate booleanOperator="surrogate">
                 <SimplePredicate field="age" operator="greaterThan" value="30"/>
                 <SimplePredicate field="age" operator="lessThan" value="10"/>
               </CompoundPredicate>"#,
        )
        .unwrap();
        let predicate = builder.build(Some(&element)).unwrap();

        let sample = Sample::new(indexer.len());
        assert!(matches!(
            predicate.test(&sample),
            Err(ScoreError::MissingValue(_))
        ));
    }

    #[test]
    fn xor_is_true_when_any_child_differs_from_first() {
        let (indexer, interner) = setup();
        let builder = PredicateBuilder::new(&indexer, &interner, 150);
        let element = Element::parse(
            r#"<CompoundPredicate booleanOperator="xor"><True/><False/></CompoundPredicate>"#,
        )
        .unwrap();
        let predicate = builder.build(Some(&element)).unwrap();
        assert!(predicate.test(&Sample::new(2)).unwrap());
    }
}
