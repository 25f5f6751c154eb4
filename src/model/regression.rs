//! Regression models.
//!
//! One regression table per target: a single table for a numeric target, one
//! table per category for a categorical target. Each table sums an intercept
//! with its numeric, categorical and interaction terms; the raw scores go
//! through the model's normalization method.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::math::NormalizationMethod;
use crate::predicate::required_attribute;
use crate::sample::Sample;
use crate::schema::MiningFunction;
use crate::target::format_number;
use crate::value::{StringInterner, Value, ValueKey};
use crate::xml::Element;

use super::InternalScore;

/// `coefficient * value^exponent`; a missing input contributes nothing.
#[derive(Debug)]
struct NumericPredictor {
    field: usize,
    coefficient: f64,
    exponent: f64,
}

impl NumericPredictor {
    fn term(&self, sample: &Sample) -> f64 {
        let value = sample.value(self.field);
        if value.missing {
            return 0.0;
        }
        self.coefficient * value.number.powf(self.exponent)
    }
}

/// A per-category coefficient; missing input or an unknown category
/// contributes nothing.
#[derive(Debug)]
struct CategoricalPredictor {
    field: usize,
    coefficients: HashMap<ValueKey, f64>,
}

impl CategoricalPredictor {
    fn term(&self, sample: &Sample) -> f64 {
        let value = sample.value(self.field);
        if value.missing {
            return 0.0;
        }
        self.coefficients
            .get(&ValueKey::from(value))
            .copied()
            .unwrap_or(0.0)
    }
}

/// One field factor of an interaction term.
#[derive(Debug)]
struct TermField {
    field: usize,
    name: String,
    map_missing_to: Option<Value>,
}

/// `coefficient * product(fields)`; any missing input fails the term.
#[derive(Debug)]
struct PredictorTerm {
    coefficient: f64,
    fields: Vec<TermField>,
}

impl PredictorTerm {
    fn term(&self, sample: &Sample) -> Result<f64> {
        let mut product = 1.0;
        for field in &self.fields {
            let slot = sample.value(field.field);
            let value = if slot.missing {
                field
                    .map_missing_to
                    .clone()
                    .unwrap_or_else(Value::missing)
            } else {
                slot.clone()
            };
            if value.missing {
                return Err(ScoreError::MissingValue(format!(
                    "missing value for predictor term field: {}",
                    field.name
                )));
            }
            product *= value.number;
        }
        Ok(self.coefficient * product)
    }
}

/// One linear combination.
#[derive(Debug)]
pub struct RegressionTable {
    intercept: f64,
    pub target_category: Option<String>,
    numeric: Vec<NumericPredictor>,
    categorical: Vec<CategoricalPredictor>,
    terms: Vec<PredictorTerm>,
}

impl RegressionTable {
    fn parse(
        element: &Element,
        indexer: &FieldIndexer,
        interner: &StringInterner,
    ) -> Result<RegressionTable> {
        let intercept = element.double_attribute("intercept").unwrap_or(0.0);
        let target_category = element.attribute("targetCategory").map(str::to_string);

        let mut numeric = Vec::new();
        for predictor in element.children("NumericPredictor") {
            let name = required_attribute(predictor, "name")?;
            numeric.push(NumericPredictor {
                field: strict_index(indexer, name)?,
                coefficient: predictor.double_attribute("coefficient").ok_or_else(|| {
                    ScoreError::Parsing(format!("NumericPredictor {name} has no coefficient"))
                })?,
                exponent: predictor.double_attribute("exponent").unwrap_or(1.0),
            });
        }

        // all CategoricalPredictor rows of one field collapse into a single
        // per-field coefficient map
        let mut categorical = Vec::new();
        let mut seen = Vec::new();
        for predictor in element.children("CategoricalPredictor") {
            let name = required_attribute(predictor, "name")?.to_string();
            if seen.contains(&name) {
                continue;
            }
            let field = strict_index(indexer, &name)?;
            let datatype = indexer.type_of(&name).map_err(|_| {
                ScoreError::Parsing(format!("categorical predictor field has no type: {name}"))
            })?;
            let mut coefficients = HashMap::new();
            for row in element.children_by_attribute("CategoricalPredictor", "name", &name) {
                let value =
                    Value::from_text(required_attribute(row, "value")?, datatype, interner)?;
                let coefficient = row.double_attribute("coefficient").ok_or_else(|| {
                    ScoreError::Parsing(format!("CategoricalPredictor {name} has no coefficient"))
                })?;
                coefficients.insert(ValueKey::from(&value), coefficient);
            }
            categorical.push(CategoricalPredictor {
                field,
                coefficients,
            });
            seen.push(name);
        }

        let mut terms = Vec::new();
        for term in element.children("PredictorTerm") {
            let mut fields = Vec::new();
            for field_ref in term.children("FieldRef") {
                let name = required_attribute(field_ref, "field")?.to_string();
                let field = strict_index(indexer, &name)?;
                let map_missing_to = match field_ref.attribute("mapMissingTo") {
                    Some(text) => {
                        let datatype = indexer.type_of(&name).map_err(|_| {
                            ScoreError::Parsing(format!("predictor term field has no type: {name}"))
                        })?;
                        Some(Value::from_text(text, datatype, interner)?)
                    }
                    None => None,
                };
                fields.push(TermField {
                    field,
                    name,
                    map_missing_to,
                });
            }
            terms.push(PredictorTerm {
                coefficient: term.double_attribute("coefficient").ok_or_else(|| {
                    ScoreError::Parsing("PredictorTerm has no coefficient".to_string())
                })?,
                fields,
            });
        }

        Ok(RegressionTable {
            intercept,
            target_category,
            numeric,
            categorical,
            terms,
        })
    }

    /// Raw score: intercept plus all terms.
    pub fn score(&self, sample: &Sample) -> Result<f64> {
        let mut partial = 0.0;
        for predictor in &self.numeric {
            partial += predictor.term(sample);
        }
        for predictor in &self.categorical {
            partial += predictor.term(sample);
        }
        for term in &self.terms {
            partial += term.term(sample)?;
        }
        Ok(self.intercept + partial)
    }
}

fn strict_index(indexer: &FieldIndexer, name: &str) -> Result<usize> {
    indexer.index_of(name).map_err(|_| {
        ScoreError::Parsing(format!("regression predictor references unknown field: {name}"))
    })
}

/// A regression model: single-target or one table per class.
#[derive(Debug)]
pub struct RegressionModel {
    mining_function: MiningFunction,
    normalization: NormalizationMethod,
    tables: Vec<RegressionTable>,
    /// Stable category list: table target categories, or the single target
    /// field name for a numeric target.
    classes: Vec<String>,
}

impl RegressionModel {
    pub fn parse(
        element: &Element,
        mining_function: MiningFunction,
        target_name: &str,
        indexer: &FieldIndexer,
        interner: &StringInterner,
    ) -> Result<RegressionModel> {
        let normalization = NormalizationMethod::from_name(
            element.attribute("normalizationMethod").unwrap_or_default(),
        );

        let mut tables = Vec::new();
        for table_element in element.children("RegressionTable") {
            tables.push(RegressionTable::parse(table_element, indexer, interner)?);
        }
        if tables.is_empty() {
            return Err(ScoreError::Parsing(
                "RegressionModel has no RegressionTable".to_string(),
            ));
        }

        let classes = match mining_function {
            MiningFunction::Classification => tables
                .iter()
                .map(|table| {
                    table.target_category.clone().ok_or_else(|| {
                        ScoreError::Parsing(
                            "classification table without targetCategory".to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<String>>>()?,
            MiningFunction::Regression => vec![target_name.to_string()],
        };

        Ok(RegressionModel {
            mining_function,
            normalization,
            tables,
            classes,
        })
    }

    pub fn score(&self, sample: &Sample) -> Result<InternalScore> {
        match self.mining_function {
            MiningFunction::Regression => {
                let value = self.normalization.single(self.tables[0].score(sample)?)?;
                let mut score = InternalScore::from_double(value);
                score
                    .probabilities
                    .insert(self.classes[0].clone(), value);
                Ok(score)
            }
            MiningFunction::Classification => {
                let normalized = self.normalized_scores(sample)?;
                let winner = argmax(&normalized);
                let mut probabilities = BTreeMap::new();
                for (class, value) in self.classes.iter().zip(&normalized) {
                    probabilities.insert(class.clone(), *value);
                }
                let mut score = InternalScore::with_distribution(
                    self.classes[winner].clone(),
                    probabilities,
                );
                score.double_score = normalized[winner];
                Ok(score)
            }
        }
    }

    pub fn predict(&self, sample: &Sample) -> Result<String> {
        match self.mining_function {
            MiningFunction::Regression => Ok(format_number(
                self.normalization.single(self.tables[0].score(sample)?)?,
            )),
            MiningFunction::Classification => {
                let normalized = self.normalized_scores(sample)?;
                Ok(self.classes[argmax(&normalized)].clone())
            }
        }
    }

    fn normalized_scores(&self, sample: &Sample) -> Result<Vec<f64>> {
        let mut raw = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            raw.push(table.score(sample)?);
        }
        self.normalization.categorical(&raw)
    }
}

/// Index of the first strictly greatest score.
fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    let mut max = f64::NEG_INFINITY;
    for (position, &score) in scores.iter().enumerate() {
        if score > max {
            max = score;
            best = position;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    fn model(xml: &str, function: MiningFunction) -> (RegressionModel, FieldIndexer, StringInterner) {
        let mut indexer = FieldIndexer::new();
        indexer.get_or_set_typed("x", DataType::Double);
        indexer.get_or_set_typed("color", DataType::String);
        indexer.get_or_set_typed("y", DataType::Double);
        let interner = StringInterner::new(false);
        let element = Element::parse(xml).unwrap();
        let model =
            RegressionModel::parse(&element, function, "y", &indexer, &interner).unwrap();
        (model, indexer, interner)
    }

    #[test]
    fn table_sums_intercept_and_terms() {
        let (model, indexer, interner) = model(
            r#"<RegressionModel functionName="regression">
                 <RegressionTable intercept="1">
                   <NumericPredictor name="x" coefficient="2" exponent="2"/>
                   <CategoricalPredictor name="color" value="red" coefficient="10"/>
                 </RegressionTable>
               </RegressionModel>"#,
            MiningFunction::Regression,
        );

        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(3.0));
        sample.set(
            1,
            Value::from_text("red", DataType::String, &interner).unwrap(),
        );
        // 1 + 2 * 3^2 + 10
        assert_eq!(model.score(&sample).unwrap().double_score, 29.0);
    }

    #[test]
    fn missing_numeric_input_contributes_zero() {
        let (model, indexer, _) = model(
            r#"<RegressionModel functionName="regression">
                 <RegressionTable intercept="5">
                   <NumericPredictor name="x" coefficient="2"/>
                 </RegressionTable>
               </RegressionModel>"#,
            MiningFunction::Regression,
        );
        let sample = Sample::new(indexer.len());
        assert_eq!(model.score(&sample).unwrap().double_score, 5.0);
    }

    #[test]
    fn predictor_term_requires_all_inputs() {
        let (model, indexer, _) = model(
            r#"<RegressionModel functionName="regression">
                 <RegressionTable intercept="0">
                   <PredictorTerm coefficient="2">
                     <FieldRef field="x"/>
                     <FieldRef field="y"/>
                   </PredictorTerm>
                 </RegressionTable>
               </RegressionModel>"#,
            MiningFunction::Regression,
        );

        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(3.0));
        assert!(matches!(
            model.score(&sample),
            Err(ScoreError::MissingValue(_))
        ));

        sample.set(2, Value::number(4.0));
        assert_eq!(model.score(&sample).unwrap().double_score, 24.0);
    }

    #[test]
    fn classification_softmax_picks_argmax() {
        let (model, indexer, _) = model(
            r#"<RegressionModel functionName="classification" normalizationMethod="softmax">
                 <RegressionTable intercept="2" targetCategory="c1"/>
                 <RegressionTable intercept="0" targetCategory="c2"/>
               </RegressionModel>"#,
            MiningFunction::Classification,
        );

        let sample = Sample::new(indexer.len());
        let score = model.score(&sample).unwrap();
        assert_eq!(score.score, "c1");
        let sum: f64 = score.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        let expected = 2.0f64.exp() / (2.0f64.exp() + 1.0);
        assert!((score.probabilities["c1"] - expected).abs() < 1e-12);
    }

    #[test]
    fn cauchit_with_three_tables_is_a_math_error() {
        let (model, indexer, _) = model(
            r#"<RegressionModel functionName="classification" normalizationMethod="cauchit">
                 <RegressionTable intercept="1" targetCategory="a"/>
                 <RegressionTable intercept="2" targetCategory="b"/>
                 <RegressionTable intercept="3" targetCategory="c"/>
               </RegressionModel>"#,
            MiningFunction::Classification,
        );
        let sample = Sample::new(indexer.len());
        assert!(matches!(model.score(&sample), Err(ScoreError::Math(_))));
    }
}
