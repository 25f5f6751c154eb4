//! # Field Catalog
//!
//! Declarative metadata for every field the model touches: data fields with
//! their constraints, mining fields with usage and treatment policies,
//! derived fields with their expressions, and the dependency ordering of the
//! derived fields.

mod dag;
mod data_field;
mod derived_field;
mod mining_field;

pub use dag::derived_field_order;
pub use data_field::{DataDictionary, DataField};
pub use derived_field::{DerivedField, TransformationDictionary};
pub use mining_field::{MiningField, MiningSchema};

use crate::error::{Result, ScoreError};

/// Function of the model: what kind of target it predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningFunction {
    Classification,
    Regression,
}

impl MiningFunction {
    pub fn from_name(name: &str) -> Result<MiningFunction> {
        match name.to_ascii_lowercase().as_str() {
            "classification" => Ok(MiningFunction::Classification),
            "regression" => Ok(MiningFunction::Regression),
            other => Err(ScoreError::Parsing(format!(
                "unsupported mining function: {other}"
            ))),
        }
    }
}

/// Usage of a mining field within the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldUsage {
    #[default]
    Active,
    Target,
    Supplementary,
    Group,
    Order,
    FrequencyWeight,
    AnalysisWeight,
}

impl FieldUsage {
    /// Parse a `usageType` attribute. `predicted` is the pre-4.1 spelling of
    /// `target`. Unknown values default to `Active`.
    pub fn from_name(name: &str) -> FieldUsage {
        match name.to_ascii_lowercase().as_str() {
            "target" | "predicted" => FieldUsage::Target,
            "supplementary" => FieldUsage::Supplementary,
            "group" => FieldUsage::Group,
            "order" => FieldUsage::Order,
            "frequency_weight" => FieldUsage::FrequencyWeight,
            "analysis_weight" => FieldUsage::AnalysisWeight,
            _ => FieldUsage::Active,
        }
    }
}

/// Operational type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpType {
    Categorical,
    Ordinal,
    Continuous,
    #[default]
    Undefined,
}

impl OpType {
    pub fn from_name(name: &str) -> OpType {
        match name.to_ascii_lowercase().as_str() {
            "categorical" => OpType::Categorical,
            "ordinal" => OpType::Ordinal,
            "continuous" => OpType::Continuous,
            _ => OpType::Undefined,
        }
    }
}

/// Role of a declared `Value` inside a `DataField`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueProperty {
    #[default]
    Valid,
    Invalid,
    Missing,
}

impl ValueProperty {
    pub fn from_name(name: &str) -> ValueProperty {
        match name.to_ascii_lowercase().as_str() {
            "invalid" => ValueProperty::Invalid,
            "missing" => ValueProperty::Missing,
            _ => ValueProperty::Valid,
        }
    }
}

/// Boundary kinds of an interval of continuous values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    ClosedClosed,
    OpenOpen,
    ClosedOpen,
    OpenClosed,
}

impl Closure {
    pub fn from_name(name: &str) -> Result<Closure> {
        match name.to_ascii_lowercase().as_str() {
            "closedclosed" => Ok(Closure::ClosedClosed),
            "openopen" => Ok(Closure::OpenOpen),
            "closedopen" => Ok(Closure::ClosedOpen),
            "openclosed" => Ok(Closure::OpenClosed),
            other => Err(ScoreError::Parsing(format!(
                "unsupported interval closure: {other}"
            ))),
        }
    }
}

/// Policy for values outside the declared low/high bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutlierTreatment {
    #[default]
    AsIs,
    AsMissingValues,
    AsExtremeValues,
}

impl OutlierTreatment {
    pub fn from_name(name: &str) -> OutlierTreatment {
        match name.to_ascii_lowercase().as_str() {
            "asmissingvalues" => OutlierTreatment::AsMissingValues,
            "asextremevalues" => OutlierTreatment::AsExtremeValues,
            _ => OutlierTreatment::AsIs,
        }
    }
}

/// Policy for values that violate the field's constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidValueTreatment {
    #[default]
    ReturnInvalid,
    AsIs,
    AsMissing,
}

impl InvalidValueTreatment {
    pub fn from_name(name: &str) -> InvalidValueTreatment {
        match name.to_ascii_lowercase().as_str() {
            "asis" => InvalidValueTreatment::AsIs,
            "asmissing" => InvalidValueTreatment::AsMissing,
            _ => InvalidValueTreatment::ReturnInvalid,
        }
    }
}

/// Provenance of a missing-value replacement. Recorded for information only;
/// scoring uses the replacement value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValueTreatment {
    #[default]
    AsIs,
    AsMean,
    AsMode,
    AsMedian,
    AsValue,
}

impl MissingValueTreatment {
    pub fn from_name(name: &str) -> MissingValueTreatment {
        match name.to_ascii_lowercase().as_str() {
            "asmean" => MissingValueTreatment::AsMean,
            "asmode" => MissingValueTreatment::AsMode,
            "asmedian" => MissingValueTreatment::AsMedian,
            "asvalue" => MissingValueTreatment::AsValue,
            _ => MissingValueTreatment::AsIs,
        }
    }
}
