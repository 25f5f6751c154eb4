//! Mining fields and the mining schema.
//!
//! The mining schema is the contract between the model and its inputs. For
//! every incoming raw sample it runs *prepare*: construct a typed value per
//! field, fall back to the missing replacement when the input is absent or
//! unparsable, then apply the declared invalid-value and outlier policies.
//! *Validate* is the separate pass checking every prepared value against its
//! data-field constraints.

use std::collections::HashMap;

use crate::error::{Result, ScoreError};
use crate::predicate::{required_attribute, Predicate};
use crate::sample::Sample;
use crate::value::{DataType, StringInterner, Value};
use crate::xml::Element;

use super::{
    DataDictionary, FieldUsage, InvalidValueTreatment, MissingValueTreatment, OpType,
    OutlierTreatment,
};

/// One field used by the model, with its usage and treatment policies.
#[derive(Debug, Clone)]
pub struct MiningField {
    pub name: String,
    pub index: usize,
    pub datatype: DataType,
    pub usage: FieldUsage,
    pub optype: OpType,
    pub importance: Option<f64>,
    pub outlier_treatment: Option<OutlierTreatment>,
    pub low_value: Option<Value>,
    pub high_value: Option<Value>,
    /// Replacement declared on the mining field itself.
    pub missing_replacement: Option<Value>,
    /// Where the replacement came from. Informational.
    pub missing_treatment: MissingValueTreatment,
    pub invalid_treatment: Option<InvalidValueTreatment>,
    /// Constraints inherited from the data field.
    pub constraints: Option<Predicate>,
    /// Replacement declared on the data field, used when the mining field
    /// declares none.
    field_missing_replacement: Option<Value>,
    pub n_values: usize,
}

impl MiningField {
    fn parse(
        element: &Element,
        dictionary: &DataDictionary,
        interner: &StringInterner,
    ) -> Result<Option<MiningField>> {
        let name = required_attribute(element, "name")?;
        // mining fields without a data field declaration are outputs
        let Some(data_field) = dictionary.get(name) else {
            return Ok(None);
        };

        let outlier_treatment = element.attribute("outliers").map(OutlierTreatment::from_name);
        let bound = |attribute: &str| -> Result<Option<Value>> {
            match (outlier_treatment.is_some(), element.attribute(attribute)) {
                (true, Some(text)) => {
                    Ok(Some(Value::from_text(text, data_field.datatype, interner)?))
                }
                _ => Ok(None),
            }
        };

        Ok(Some(MiningField {
            name: name.to_string(),
            index: data_field.index,
            datatype: data_field.datatype,
            usage: FieldUsage::from_name(element.attribute("usageType").unwrap_or_default()),
            optype: OpType::from_name(element.attribute("optype").unwrap_or_default()),
            importance: element.double_attribute("importance"),
            low_value: bound("lowValue")?,
            high_value: bound("highValue")?,
            outlier_treatment,
            missing_replacement: element
                .attribute("missingValueReplacement")
                .map(|text| Value::from_text(text, data_field.datatype, interner))
                .transpose()?,
            missing_treatment: MissingValueTreatment::from_name(
                element
                    .attribute("missingValueTreatmentMethod")
                    .unwrap_or_default(),
            ),
            invalid_treatment: element
                .attribute("invalidValueTreatmentMethod")
                .map(InvalidValueTreatment::from_name),
            constraints: data_field.constraints.clone(),
            field_missing_replacement: data_field.missing_replacement.clone(),
            n_values: data_field.n_values,
        }))
    }

    /// The value standing in for a missing input: the mining-field
    /// replacement, the data-field replacement, or missing.
    fn handle_missing(&self) -> Value {
        self.missing_replacement
            .clone()
            .or_else(|| self.field_missing_replacement.clone())
            .unwrap_or_else(Value::missing)
    }

    fn is_invalid(&self, sample: &Sample) -> bool {
        match &self.constraints {
            None => false,
            Some(constraints) => !constraints.test(sample).unwrap_or(true),
        }
    }

    fn handle_invalid(&self, value: &Value) -> Result<Value> {
        match self.invalid_treatment.unwrap_or_default() {
            InvalidValueTreatment::ReturnInvalid => Err(ScoreError::InvalidValue(format!(
                "invalid value for field: {}",
                self.name
            ))),
            InvalidValueTreatment::AsMissing => Ok(self.handle_missing()),
            InvalidValueTreatment::AsIs => Ok(value.clone()),
        }
    }

    /// Outside the declared bounds. Only meaningful when both bounds exist
    /// and the slot holds a concrete value; otherwise kept as-is.
    fn is_outlier(&self, value: &Value) -> bool {
        match (&self.low_value, &self.high_value) {
            (Some(low), Some(high)) => {
                !value.missing
                    && self.outlier_treatment.is_some()
                    && (value.number < low.number || value.number > high.number)
            }
            _ => false,
        }
    }

    fn handle_outlier(&self, value: &Value) -> Value {
        match self.outlier_treatment.unwrap_or_default() {
            OutlierTreatment::AsMissingValues => self.handle_missing(),
            OutlierTreatment::AsExtremeValues => {
                // both bounds are present when this treatment fires
                let low = self.low_value.as_ref().map_or(f64::MIN, |v| v.number);
                let high = self.high_value.as_ref().map_or(f64::MAX, |v| v.number);
                if value.number < low {
                    Value::number(low)
                } else {
                    Value::number(high)
                }
            }
            OutlierTreatment::AsIs => value.clone(),
        }
    }

    /// Check the inherited constraints against the prepared sample. Missing
    /// slots pass; they cannot violate a value constraint.
    pub fn validate(&self, sample: &Sample) -> bool {
        match &self.constraints {
            None => true,
            Some(constraints) => constraints.test(sample).unwrap_or(true),
        }
    }
}

/// The collection of mining fields for one model element.
#[derive(Debug, Clone, Default)]
pub struct MiningSchema {
    fields: Vec<MiningField>,
    target: Option<usize>,
}

impl MiningSchema {
    pub fn parse(
        element: &Element,
        dictionary: &DataDictionary,
        interner: &StringInterner,
    ) -> Result<MiningSchema> {
        let mut fields = Vec::new();
        for field_element in element.children("MiningField") {
            if let Some(field) = MiningField::parse(field_element, dictionary, interner)? {
                fields.push(field);
            }
        }
        let target = fields
            .iter()
            .position(|field| field.usage == FieldUsage::Target);

        Ok(MiningSchema { fields, target })
    }

    pub fn fields(&self) -> &[MiningField] {
        &self.fields
    }

    pub fn target_field(&self) -> Option<&MiningField> {
        self.target.map(|position| &self.fields[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }

    /// Fill the sample from the raw input map, applying each non-target
    /// field's missing, invalid and outlier policies. Fails only when a
    /// `returnInvalid` treatment fires.
    pub fn prepare(
        &self,
        sample: &mut Sample,
        input: &HashMap<String, String>,
        interner: &StringInterner,
    ) -> Result<()> {
        let target_index = self.target_field().map(|field| field.index);
        for field in &self.fields {
            if Some(field.index) == target_index {
                continue;
            }

            // treatments apply only to inputs that actually parsed; absent
            // or unconvertible inputs take the missing replacement as-is
            let parsed = input
                .get(&field.name)
                .and_then(|text| Value::from_text(text, field.datatype, interner).ok());
            match parsed {
                None => sample.set(field.index, field.handle_missing()),
                Some(value) => {
                    sample.set(field.index, value);

                    if field.invalid_treatment.is_some() && field.is_invalid(sample) {
                        let current = sample.value(field.index).clone();
                        let replacement = field.handle_invalid(&current)?;
                        sample.set(field.index, replacement);
                    }
                    if field.outlier_treatment.is_some() {
                        let current = sample.value(field.index).clone();
                        if field.is_outlier(&current) {
                            sample.set(field.index, field.handle_outlier(&current));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Every non-target field must pass its data-field constraints.
    pub fn validate(&self, sample: &Sample) -> bool {
        let target_index = self.target_field().map(|field| field.index);
        self.fields
            .iter()
            .filter(|field| Some(field.index) != target_index)
            .all(|field| field.validate(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::indexer::FieldIndexer;

    fn schema_from(data_xml: &str, schema_xml: &str) -> (MiningSchema, FieldIndexer, StringInterner) {
        let mut indexer = FieldIndexer::new();
        let interner = StringInterner::new(false);
        let dictionary = DataDictionary::parse(
            &Element::parse(data_xml).unwrap(),
            &mut indexer,
            &interner,
            &EngineConfig::default(),
        )
        .unwrap();
        let schema =
            MiningSchema::parse(&Element::parse(schema_xml).unwrap(), &dictionary, &interner)
                .unwrap();
        (schema, indexer, interner)
    }

    const DICTIONARY: &str = r#"
        <DataDictionary numberOfFields="2">
          <DataField name="age" dataType="double" optype="continuous">
            <Interval closure="closedClosed" leftMargin="0" rightMargin="120"/>
          </DataField>
          <DataField name="label" dataType="string" optype="categorical"/>
        </DataDictionary>"#;

    #[test]
    fn prepare_applies_missing_replacement() {
        let (schema, indexer, interner) = schema_from(
            DICTIONARY,
            r#"<MiningSchema>
                 <MiningField name="age" missingValueReplacement="33"/>
                 <MiningField name="label" usageType="target"/>
               </MiningSchema>"#,
        );

        let mut sample = Sample::new(indexer.len());
        schema
            .prepare(&mut sample, &HashMap::new(), &interner)
            .unwrap();
        assert_eq!(sample.value(0).number, 33.0);
    }

    #[test]
    fn prepare_clamps_outliers_as_extremes() {
        let (schema, indexer, interner) = schema_from(
            DICTIONARY,
            r#"<MiningSchema>
                 <MiningField name="age" outliers="asExtremeValues" lowValue="18" highValue="65"/>
                 <MiningField name="label" usageType="target"/>
               </MiningSchema>"#,
        );

        let mut sample = Sample::new(indexer.len());
        let input = HashMap::from([("age".to_string(), "99".to_string())]);
        schema.prepare(&mut sample, &input, &interner).unwrap();
        assert_eq!(sample.value(0).number, 65.0);
    }

    #[test]
    fn return_invalid_treatment_fails_prepare() {
        let (schema, indexer, interner) = schema_from(
            DICTIONARY,
            r#"<MiningSchema>
                 <MiningField name="age" invalidValueTreatmentMethod="returnInvalid"/>
                 <MiningField name="label" usageType="target"/>
               </MiningSchema>"#,
        );

        let mut sample = Sample::new(indexer.len());
        let input = HashMap::from([("age".to_string(), "150".to_string())]);
        assert!(matches!(
            schema.prepare(&mut sample, &input, &interner),
            Err(ScoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn as_missing_treatment_routes_to_missing_handler() {
        let (schema, indexer, interner) = schema_from(
            DICTIONARY,
            r#"<MiningSchema>
                 <MiningField name="age" invalidValueTreatmentMethod="asMissing"
                              missingValueReplacement="50"/>
                 <MiningField name="label" usageType="target"/>
               </MiningSchema>"#,
        );

        let mut sample = Sample::new(indexer.len());
        let input = HashMap::from([("age".to_string(), "150".to_string())]);
        schema.prepare(&mut sample, &input, &interner).unwrap();
        assert_eq!(sample.value(0).number, 50.0);
    }

    #[test]
    fn validate_flags_out_of_interval_values() {
        let (schema, indexer, _) = schema_from(
            DICTIONARY,
            r#"<MiningSchema>
                 <MiningField name="age"/>
                 <MiningField name="label" usageType="target"/>
               </MiningSchema>"#,
        );

        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(200.0));
        assert!(!schema.validate(&sample));
        sample.set(0, Value::number(30.0));
        assert!(schema.validate(&sample));
    }
}
