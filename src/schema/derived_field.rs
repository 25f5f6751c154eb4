//! Derived fields and the transformation dictionary.
//!
//! A derived field is a feature computed from other features by an owned
//! expression. The dictionary keeps document order; the evaluation order over
//! it is produced separately by the DAG builder.

use std::collections::HashMap;

use crate::error::Result;
use crate::expression::{Expression, ExpressionBuilder};
use crate::indexer::FieldIndexer;
use crate::predicate::required_attribute;
use crate::sample::Sample;
use crate::value::{DataType, StringInterner};
use crate::xml::Element;

use super::OpType;

/// One computed feature.
#[derive(Debug, Clone)]
pub struct DerivedField {
    pub name: String,
    pub optype: OpType,
    pub datatype: DataType,
    pub index: usize,
    pub expression: Expression,
}

impl DerivedField {
    pub fn parse(
        element: &Element,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
    ) -> Result<DerivedField> {
        let name = required_attribute(element, "name")?.to_string();
        let optype = OpType::from_name(element.attribute("optype").unwrap_or_default());
        let datatype = DataType::from_name(required_attribute(element, "dataType")?)?;
        let (index, datatype) = indexer.get_or_set_typed(&name, datatype);

        let expression_element = Expression::find_in(element).ok_or_else(|| {
            crate::error::ScoreError::Parsing(format!(
                "derived field {name} has no expression"
            ))
        })?;
        let expression =
            ExpressionBuilder::new(indexer, interner).build(expression_element, datatype)?;

        Ok(DerivedField {
            name,
            optype,
            datatype,
            index,
            expression,
        })
    }

    /// Evaluate the expression and write the result into the field's slot.
    pub fn prepare(&self, sample: &mut Sample, interner: &StringInterner) -> Result<()> {
        let value = self.expression.eval(sample, interner)?;
        sample.set(self.index, value);
        Ok(())
    }
}

/// All derived fields of one model element, in document order. Global
/// transformation-dictionary fields come first, local transformations are
/// appended after them.
#[derive(Debug, Clone, Default)]
pub struct TransformationDictionary {
    fields: Vec<DerivedField>,
    by_name: HashMap<String, usize>,
}

impl TransformationDictionary {
    pub fn parse(
        element: &Element,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
    ) -> Result<TransformationDictionary> {
        let mut dictionary = TransformationDictionary::default();
        for field_element in element.children("DerivedField") {
            dictionary.add(DerivedField::parse(field_element, indexer, interner)?);
        }
        Ok(dictionary)
    }

    pub fn add(&mut self, field: DerivedField) {
        self.by_name.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DerivedField> {
        self.by_name.get(name).map(|&position| &self.fields[position])
    }

    /// Fields in document order.
    pub fn fields(&self) -> &[DerivedField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
