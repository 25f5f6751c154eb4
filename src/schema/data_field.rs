//! Data fields and the data dictionary.
//!
//! A `DataField` declares one feature available to the model: its type, its
//! slot in the indexer, and the constraints on admissible values. Declared
//! valid values, invalid values and intervals compile into one AND-composed
//! predicate checked during validation.

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::indexer::FieldIndexer;
use crate::predicate::{interval_predicate, required_attribute, BooleanOp, Predicate};
use crate::sample::Sample;
use crate::value::{DataType, StringInterner, Value, ValueSet};
use crate::xml::Element;

use super::{OpType, ValueProperty};

/// One declared input feature.
#[derive(Debug, Clone)]
pub struct DataField {
    pub name: String,
    pub datatype: DataType,
    pub index: usize,
    pub optype: OpType,
    /// Replacement declared through `<Value property="missing">`.
    pub missing_replacement: Option<Value>,
    /// AND of declared valid values, invalid values and intervals.
    pub constraints: Option<Predicate>,
    /// Number of declared valid values; 1 when the field declares none.
    pub n_values: usize,
}

impl DataField {
    pub fn parse(
        element: &Element,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
        config: &EngineConfig,
    ) -> Result<DataField> {
        let name = required_attribute(element, "name")?.to_string();
        let datatype = DataType::from_name(required_attribute(element, "dataType")?)?;
        let (index, datatype) = indexer.get_or_set_typed(&name, datatype);
        let optype = OpType::from_name(element.attribute("optype").unwrap_or_default());

        let mut allowed = Vec::new();
        let mut forbidden = Vec::new();
        let mut missing_replacement = None;
        for value_element in element.children("Value") {
            let text = required_attribute(value_element, "value")?;
            let value = Value::from_text(text, datatype, interner)?;
            match ValueProperty::from_name(value_element.attribute("property").unwrap_or_default())
            {
                ValueProperty::Valid => allowed.push(value),
                ValueProperty::Invalid => forbidden.push(value),
                ValueProperty::Missing => missing_replacement = Some(value),
            }
        }

        let mut constraints = Vec::new();
        if !allowed.is_empty() {
            constraints.push(Predicate::SimpleSet {
                field: index,
                negated: false,
                set: ValueSet::from_values(&allowed, config.set_threshold),
            });
        }
        if !forbidden.is_empty() {
            constraints.push(Predicate::SimpleSet {
                field: index,
                negated: true,
                set: ValueSet::from_values(&forbidden, config.set_threshold),
            });
        }
        for interval in element.children("Interval") {
            constraints.push(interval_predicate(interval, index, datatype, interner)?);
        }

        let n_values = if allowed.is_empty() { 1 } else { allowed.len() };

        Ok(DataField {
            name,
            datatype,
            index,
            optype,
            missing_replacement,
            constraints: if constraints.is_empty() {
                None
            } else {
                Some(Predicate::Compound {
                    op: BooleanOp::And,
                    children: constraints,
                })
            },
            n_values,
        })
    }

    /// Check the field's constraints against a sample. Fields without
    /// constraints always pass; a missing slot cannot violate a value
    /// constraint and passes as well.
    pub fn validate(&self, sample: &Sample) -> bool {
        match &self.constraints {
            None => true,
            Some(constraints) => match constraints.test(sample) {
                Ok(valid) => valid,
                Err(_) => true,
            },
        }
    }

    /// Build a value for this field from raw text.
    pub fn create_value(&self, text: &str, interner: &StringInterner) -> Result<Value> {
        Value::from_text(text, self.datatype, interner)
    }
}

/// The `DataDictionary`: all declared data fields by name.
#[derive(Debug, Clone, Default)]
pub struct DataDictionary {
    fields: HashMap<String, DataField>,
}

impl DataDictionary {
    pub fn parse(
        element: &Element,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
        config: &EngineConfig,
    ) -> Result<DataDictionary> {
        let mut fields = HashMap::new();
        for field_element in element.children("DataField") {
            let field = DataField::parse(field_element, indexer, interner, config)?;
            fields.insert(field.name.clone(), field);
        }

        Ok(DataDictionary { fields })
    }

    pub fn get(&self, name: &str) -> Option<&DataField> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
