//! Document-to-evaluator construction.
//!
//! Dispatches on the top-level model element of a parsed PMML document and
//! builds the matching model variant, along with everything shared across
//! requests: the field indexer, the intern table, and the canonical base
//! sample.

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::sample::Sample;
use crate::schema::{DataDictionary, TransformationDictionary};
use crate::value::StringInterner;
use crate::xml::Element;

use super::ModelElement;

const MODEL_NAMES: &[&str] = &["MiningModel", "RegressionModel", "TreeModel"];

/// Document header metadata, kept for provenance.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub model_version: Option<String>,
}

impl Header {
    fn parse(element: Option<&Element>) -> Header {
        let Some(element) = element else {
            return Header::default();
        };
        Header {
            copyright: element.attribute("copyright").map(str::to_string),
            description: element.attribute("description").map(str::to_string),
            model_version: element.attribute("modelVersion").map(str::to_string),
        }
    }
}

/// A fully loaded model: the model element plus the shared load-time state.
#[derive(Debug)]
pub struct Evaluator {
    pub element: ModelElement,
    pub base_sample: Sample,
    pub indexer: FieldIndexer,
    pub interner: StringInterner,
    pub header: Header,
    pub version: Option<String>,
}

impl Evaluator {
    /// Build an evaluator from the root element of a PMML document.
    pub fn build(root: &Element, config: &EngineConfig) -> Result<Evaluator> {
        if root.name() != "PMML" {
            return Err(ScoreError::Parsing(format!(
                "root PMML element is missing, found {}",
                root.name()
            )));
        }
        let version = root.attribute("version").map(str::to_string);
        let header = Header::parse(root.child("Header"));
        if let Some(description) = &header.description {
            debug!(description = %description, "document header");
        }

        let mut indexer = FieldIndexer::new();
        let interner = StringInterner::new(config.string_hashing);

        let dictionary_element = root
            .child("DataDictionary")
            .ok_or_else(|| ScoreError::Parsing("document has no DataDictionary".to_string()))?;
        let dictionary =
            DataDictionary::parse(dictionary_element, &mut indexer, &interner, config)?;

        let transformations = match root.child("TransformationDictionary") {
            Some(element) => {
                TransformationDictionary::parse(element, &mut indexer, &interner)?
            }
            None => TransformationDictionary::default(),
        };

        let model_element = root.child_in(MODEL_NAMES).ok_or_else(|| {
            ScoreError::Parsing("unsupported or missing top-level model element".to_string())
        })?;
        let element = ModelElement::parse(
            model_element,
            &dictionary,
            &transformations,
            &mut indexer,
            &interner,
            config,
        )?;

        // the base sample takes its shape once every field has a slot
        let base_sample = Sample::new(indexer.len());

        info!(
            model = model_element.name(),
            fields = indexer.len(),
            data_fields = dictionary.len(),
            "model loaded"
        );

        Ok(Evaluator {
            element,
            base_sample,
            indexer,
            interner,
            header,
            version,
        })
    }
}
