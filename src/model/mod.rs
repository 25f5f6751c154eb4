//! # Model Variants
//!
//! The scoring core: one `ModelElement` per PMML model element, wrapping the
//! mining schema, the derived-field pipeline, the target transform, the
//! output dictionary, and one of the three model kinds (decision tree,
//! regression tables, segmented ensemble).
//!
//! Control flow per request:
//! ```text
//! clone base sample -> mining-schema prepare -> derived-field DAG
//!   -> mining-schema validate -> model dispatch -> target transform
//!   -> output dictionary -> InternalScore
//! ```

mod builder;
mod ensemble;
mod regression;
mod tree;

pub use builder::{Evaluator, Header};
pub use ensemble::{EnsembleModel, MultipleModelMethod, Segment};
pub use regression::{RegressionModel, RegressionTable};
pub use tree::TreeModel;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use crate::config::EngineConfig;
use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::sample::Sample;
use crate::schema::{
    derived_field_order, DataDictionary, DerivedField, MiningFunction, MiningSchema,
    TransformationDictionary,
};
use crate::target::{format_number, Target};
use crate::value::{DataType, StringInterner, Value};
use crate::xml::Element;

/// The prediction produced by the scoring process: both literal and double
/// representations of the score, the class probabilities, and the values
/// produced by the output dictionary.
#[derive(Debug, Clone, Default)]
pub struct InternalScore {
    /// A null prediction (no tree path matched and the strategy returns it).
    pub empty: bool,
    pub score: String,
    pub double_score: f64,
    pub probabilities: BTreeMap<String, f64>,
    pub num_outputs: BTreeMap<String, f64>,
    pub str_outputs: BTreeMap<String, String>,
}

impl InternalScore {
    pub fn empty() -> InternalScore {
        InternalScore {
            empty: true,
            double_score: f64::NAN,
            ..InternalScore::default()
        }
    }

    pub fn from_double(score: f64) -> InternalScore {
        InternalScore {
            empty: false,
            score: format_number(score),
            double_score: score,
            ..InternalScore::default()
        }
    }

    /// A score from a label; the double slot is NaN when the label is not
    /// numeric.
    pub fn from_label(score: String) -> InternalScore {
        let double_score = score.parse().unwrap_or(f64::NAN);
        InternalScore {
            empty: false,
            score,
            double_score,
            ..InternalScore::default()
        }
    }

    pub fn with_distribution(score: String, probabilities: BTreeMap<String, f64>) -> InternalScore {
        InternalScore {
            probabilities,
            ..InternalScore::from_label(score)
        }
    }
}

/// The model variant behind a model element.
#[derive(Debug)]
pub enum ModelKind {
    Tree(TreeModel),
    Regression(RegressionModel),
    Ensemble(EnsembleModel),
}

/// One PMML model element: the evaluation pipeline around a model kind.
/// Segments of an ensemble are model elements again.
#[derive(Debug)]
pub struct ModelElement {
    pub mining_function: MiningFunction,
    pub mining_schema: MiningSchema,
    pub target_name: String,
    pub target_index: usize,
    pub target_datatype: DataType,
    /// Number of declared target categories; drives vote thresholds.
    pub target_n_values: usize,
    transformations: TransformationDictionary,
    derived_order: Vec<String>,
    pub target: Target,
    output: crate::output::OutputDictionary,
    pub kind: ModelKind,
}

impl ModelElement {
    /// Build a model element (and, recursively, its segments) from its
    /// document element.
    pub fn parse(
        element: &Element,
        dictionary: &DataDictionary,
        inherited: &TransformationDictionary,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
        config: &EngineConfig,
    ) -> Result<ModelElement> {
        if element.bool_attribute("isScorable") == Some(false) {
            return Err(ScoreError::Parsing(
                "the model is defined as non-scorable".to_string(),
            ));
        }

        let mining_function = MiningFunction::from_name(crate::predicate::required_attribute(
            element,
            "functionName",
        )?)?;
        let schema_element = element.child("MiningSchema").ok_or_else(|| {
            ScoreError::Parsing(format!("{} has no MiningSchema", element.name()))
        })?;
        let mining_schema = MiningSchema::parse(schema_element, dictionary, interner)?;

        // a schema without a target still needs a slot for the prediction
        let (target_name, target_index, target_datatype, target_n_values) =
            match mining_schema.target_field() {
                Some(field) => (
                    field.name.clone(),
                    field.index,
                    field.datatype,
                    field.n_values,
                ),
                None => {
                    let name = indexer.synthetic_name();
                    let datatype = match mining_function {
                        MiningFunction::Classification => DataType::String,
                        MiningFunction::Regression => DataType::Double,
                    };
                    let (index, datatype) = indexer.get_or_set_typed(&name, datatype);
                    (name, index, datatype, 1)
                }
            };

        let mut transformations = inherited.clone();
        if let Some(local) = element.child("LocalTransformations") {
            for field_element in local.children("DerivedField") {
                transformations.add(DerivedField::parse(field_element, indexer, interner)?);
            }
        }
        let derived_order = derived_field_order(&mining_schema, &transformations);

        let target = Target::parse(
            element
                .child("Targets")
                .and_then(|targets| targets.child("Target")),
            mining_function,
        )?;
        let output = crate::output::OutputDictionary::parse(
            element.child("Output"),
            indexer,
            interner,
            &target_name,
        )?;

        let kind = match element.name() {
            "TreeModel" => ModelKind::Tree(TreeModel::parse(element, indexer, interner, config)?),
            "RegressionModel" => ModelKind::Regression(RegressionModel::parse(
                element,
                mining_function,
                &target_name,
                indexer,
                interner,
            )?),
            "MiningModel" => ModelKind::Ensemble(EnsembleModel::parse(
                element,
                mining_function,
                dictionary,
                &transformations,
                indexer,
                interner,
                config,
            )?),
            other => {
                return Err(ScoreError::Parsing(format!(
                    "unsupported model element: {other}"
                )))
            }
        };

        Ok(ModelElement {
            mining_function,
            mining_schema,
            target_name,
            target_index,
            target_datatype,
            target_n_values,
            transformations,
            derived_order,
            target,
            output,
            kind,
        })
    }

    /// Full scoring pipeline for one raw input record.
    pub fn score(
        &self,
        input: &HashMap<String, String>,
        base_sample: &Sample,
        interner: &StringInterner,
    ) -> Result<InternalScore> {
        let mut sample = base_sample.clone();
        self.mining_schema.prepare(&mut sample, input, interner)?;
        self.run_transformations(&mut sample, interner)?;
        if !self.mining_schema.validate(&sample) {
            return Err(ScoreError::InvalidValue(
                "sample did not pass input validation".to_string(),
            ));
        }

        let mut score = self.score_raw(&sample, interner)?;
        self.target.apply(&mut score);
        self.output.add_output(&mut sample, &mut score, interner)?;
        Ok(score)
    }

    /// Fast path: same pipeline, label only.
    pub fn predict(
        &self,
        input: &HashMap<String, String>,
        base_sample: &Sample,
        interner: &StringInterner,
    ) -> Result<String> {
        let mut sample = base_sample.clone();
        self.mining_schema.prepare(&mut sample, input, interner)?;
        self.run_transformations(&mut sample, interner)?;
        if !self.mining_schema.validate(&sample) {
            return Err(ScoreError::InvalidValue(
                "sample did not pass input validation".to_string(),
            ));
        }

        let label = self.predict_raw(&sample, interner)?;
        Ok(self.target.apply_label(&label))
    }

    /// Pure input check: prepare, run the derived fields, validate.
    pub fn validate(
        &self,
        input: &HashMap<String, String>,
        base_sample: &Sample,
        interner: &StringInterner,
    ) -> bool {
        let mut sample = base_sample.clone();
        if self
            .mining_schema
            .prepare(&mut sample, input, interner)
            .is_err()
        {
            return false;
        }
        if self.run_transformations(&mut sample, interner).is_err() {
            return false;
        }
        self.mining_schema.validate(&sample)
    }

    fn run_transformations(&self, sample: &mut Sample, interner: &StringInterner) -> Result<()> {
        for name in &self.derived_order {
            if let Some(field) = self.transformations.get(name) {
                field.prepare(sample, interner)?;
            }
        }
        Ok(())
    }

    /// Dispatch into the model kind on a prepared sample.
    pub(crate) fn score_raw(
        &self,
        sample: &Sample,
        interner: &StringInterner,
    ) -> Result<InternalScore> {
        match &self.kind {
            ModelKind::Tree(tree) => tree.score(sample),
            ModelKind::Regression(regression) => regression.score(sample),
            ModelKind::Ensemble(ensemble) => ensemble.score(sample, interner),
        }
    }

    /// Label-only dispatch; trees borrow the winning label.
    pub(crate) fn predict_raw<'m>(
        &'m self,
        sample: &Sample,
        interner: &StringInterner,
    ) -> Result<Cow<'m, str>> {
        match &self.kind {
            ModelKind::Tree(tree) => tree.predict(sample),
            ModelKind::Regression(regression) => {
                regression.predict(sample).map(Cow::Owned)
            }
            ModelKind::Ensemble(ensemble) => {
                Ok(Cow::Owned(ensemble.score(sample, interner)?.score))
            }
        }
    }

    /// Model-chain augmentation for the first matching segment: run the
    /// derived fields on the mutated sample, write the transformed
    /// prediction into the target slot, expose the output fields.
    pub(crate) fn augment_first(
        &self,
        sample: &mut Sample,
        interner: &StringInterner,
    ) -> Result<()> {
        self.run_transformations(sample, interner)?;
        self.augment(sample, interner)
    }

    /// Later augmentations skip the derived fields; their inputs are already
    /// present.
    pub(crate) fn augment(&self, sample: &mut Sample, interner: &StringInterner) -> Result<()> {
        let label = self.predict_raw(sample, interner)?;
        let transformed = self.target.apply_label(&label);
        let value = Value::from_text(&transformed, self.target_datatype, interner)
            .unwrap_or_else(|_| Value::missing());
        sample.set(self.target_index, value);
        self.output.prepare(sample, interner)?;
        Ok(())
    }

    /// The closing segment of a model chain: a full score on the augmented
    /// sample.
    pub(crate) fn augment_last(
        &self,
        sample: &mut Sample,
        interner: &StringInterner,
    ) -> Result<InternalScore> {
        let mut score = self.score_raw(sample, interner)?;
        self.target.apply(&mut score);
        self.output.add_output(sample, &mut score, interner)?;
        Ok(score)
    }
}
