//! # pmml-score
//!
//! A scoring engine for PMML documents: load a serialized, already-trained
//! predictive model and evaluate it against input records in microseconds
//! per record. This is not a training framework; it only consumes trained
//! artifacts and produces scores.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! PMML document (plain XML or single-entry ZIP)
//!     ↓
//! [xml]                  → owned element tree
//!     ↓
//! [model::builder]       → field indexer + intern table + model variant
//!     ↓                     (tree | regression | ensemble)
//! Model::score(record)
//!     ↓
//! clone base sample → mining-schema prepare → derived-field DAG
//!     → mining-schema validate → model dispatch → target transform
//!     → output dictionary → Prediction
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use pmml_score::Model;
//!
//! let model = Model::load("iris_tree.pmml", false)?;
//!
//! let sample = HashMap::from([
//!     ("sepal_length".to_string(), "6.6".to_string()),
//!     ("sepal_width".to_string(), "2.9".to_string()),
//!     ("petal_length".to_string(), "4.6".to_string()),
//!     ("petal_width".to_string(), "1.3".to_string()),
//! ]);
//!
//! let prediction = model.score(&sample)?;
//! println!("{} {:?}", prediction.as_string(), prediction.distribution());
//! # Ok::<(), pmml_score::ScoreError>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `xml` | document reading (quick-xml events → owned tree, ZIP container) |
//! | `value` | unified runtime scalar + string intern table |
//! | `indexer` | dense field slots and type tags |
//! | `schema` | data/mining/derived fields, treatment policies, DAG order |
//! | `predicate` | comparison/set/compound conditions |
//! | `expression` | derived-field computations and built-in functions |
//! | `math` | regression link functions and normalizations |
//! | `target` | post-score transform and label remapping |
//! | `output` | declared post-score fields |
//! | `model` | tree / regression / ensemble evaluation |
//!
//! The loaded model is immutable: concurrent callers share it by reference
//! without locks. The only shared mutable state is the intern table, which
//! accepts atomic insertions when scoring sees a brand-new string value.

pub mod config;
pub mod error;
pub mod expression;
pub mod indexer;
pub mod math;
pub mod model;
pub mod output;
pub mod predicate;
pub mod sample;
pub mod schema;
pub mod target;
pub mod value;
pub mod xml;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

pub use config::EngineConfig;
pub use error::{Result, ScoreError};

use model::{Evaluator, Header, InternalScore};

/// A loaded predictive model.
pub struct Model {
    evaluator: Evaluator,
}

impl Model {
    /// Load a model document from disk; `zipped` reads it out of a
    /// single-entry ZIP archive instead.
    pub fn load(path: impl AsRef<Path>, zipped: bool) -> Result<Model> {
        Model::load_with_config(path, zipped, EngineConfig::default())
    }

    /// Load with explicit engine configuration.
    pub fn load_with_config(
        path: impl AsRef<Path>,
        zipped: bool,
        config: EngineConfig,
    ) -> Result<Model> {
        let root = xml::read_document(path.as_ref(), zipped)
            .map_err(|error| ScoreError::Parsing(error.to_string()))?;
        Ok(Model {
            evaluator: Evaluator::build(&root, &config)?,
        })
    }

    /// Score one record: the full prediction with distribution and declared
    /// outputs. Never returns partial results.
    pub fn score(&self, sample: &HashMap<String, String>) -> Result<Prediction> {
        let score = self.evaluator.element.score(
            sample,
            &self.evaluator.base_sample,
            &self.evaluator.interner,
        )?;
        Ok(Prediction {
            score: Arc::new(score),
        })
    }

    /// Score one record, returning only the winning label. Same semantics as
    /// [`Model::score`], slightly cheaper payload.
    pub fn predict(&self, sample: &HashMap<String, String>) -> Result<String> {
        self.evaluator.element.predict(
            sample,
            &self.evaluator.base_sample,
            &self.evaluator.interner,
        )
    }

    /// Pure input check: would this record pass the mining schema's
    /// constraints?
    pub fn validate(&self, sample: &HashMap<String, String>) -> bool {
        self.evaluator.element.validate(
            sample,
            &self.evaluator.base_sample,
            &self.evaluator.interner,
        )
    }

    /// Name of the declared target field, if the mining schema has one.
    pub fn target_name(&self) -> Option<&str> {
        self.evaluator
            .element
            .mining_schema
            .target_field()
            .map(|field| field.name.as_str())
    }

    /// Document header metadata.
    pub fn header(&self) -> &Header {
        &self.evaluator.header
    }

    /// PMML version attribute of the document.
    pub fn version(&self) -> Option<&str> {
        self.evaluator.version.as_deref()
    }
}

/// One prediction, held through a shared handle.
#[derive(Debug, Clone)]
pub struct Prediction {
    score: Arc<InternalScore>,
}

impl Prediction {
    /// The winning label (or the formatted numeric score).
    pub fn as_string(&self) -> &str {
        &self.score.score
    }

    /// The numeric score; NaN when the label is not numeric.
    pub fn as_double(&self) -> f64 {
        self.score.double_score
    }

    /// Per-class probabilities (classification) or per-class raw scores.
    pub fn distribution(&self) -> &BTreeMap<String, f64> {
        &self.score.probabilities
    }

    /// Numeric output-dictionary values.
    pub fn num_outputs(&self) -> &BTreeMap<String, f64> {
        &self.score.num_outputs
    }

    /// String output-dictionary values.
    pub fn str_outputs(&self) -> &BTreeMap<String, String> {
        &self.score.str_outputs
    }

    /// Whether the model produced a null prediction.
    pub fn is_empty(&self) -> bool {
        self.score.empty
    }

    /// The full prediction as a JSON value. Non-finite numbers (a NaN double
    /// slot for a non-numeric label) serialize as null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Map, Value as Json};

        fn number(value: f64) -> Json {
            serde_json::Number::from_f64(value).map_or(Json::Null, Json::Number)
        }
        fn numbers(map: &BTreeMap<String, f64>) -> Json {
            Json::Object(
                map.iter()
                    .map(|(key, &value)| (key.clone(), number(value)))
                    .collect(),
            )
        }

        let mut root = Map::new();
        root.insert("score".to_string(), Json::String(self.score.score.clone()));
        root.insert(
            "double_score".to_string(),
            number(self.score.double_score),
        );
        root.insert(
            "distribution".to_string(),
            numbers(&self.score.probabilities),
        );
        root.insert("num_outputs".to_string(), numbers(&self.score.num_outputs));
        root.insert(
            "str_outputs".to_string(),
            Json::Object(
                self.score
                    .str_outputs
                    .iter()
                    .map(|(key, value)| (key.clone(), Json::String(value.clone())))
                    .collect(),
            ),
        );
        Json::Object(root)
    }
}
