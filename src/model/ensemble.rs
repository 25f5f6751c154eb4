//! Segmented ensemble models.
//!
//! An ordered list of segments, each a predicate-gated child model, combined
//! by the declared multiple-model method. Child models may themselves be
//! ensembles.
//!
//! With the `parallel` feature, the commutative aggregations (majority vote,
//! regression average, sum) reduce segments in parallel once the ensemble is
//! larger than the configured threshold; results are independent of worker
//! count up to floating-point reordering.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::predicate::{required_attribute, Predicate, PredicateBuilder};
use crate::sample::Sample;
use crate::schema::{DataDictionary, MiningFunction, TransformationDictionary};
use crate::value::StringInterner;
use crate::xml::Element;

use super::{InternalScore, ModelElement};

const PREDICATE_NAMES: &[&str] = &[
    "SimplePredicate",
    "SimpleSetPredicate",
    "CompoundPredicate",
    "True",
    "False",
];

const MODEL_NAMES: &[&str] = &["MiningModel", "TreeModel", "RegressionModel"];

/// How matching segments combine into one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleModelMethod {
    MajorityVote,
    WeightedMajorityVote,
    Average,
    WeightedAverage,
    Sum,
    ModelChain,
}

impl MultipleModelMethod {
    pub fn from_name(name: &str) -> Result<MultipleModelMethod> {
        match name.to_ascii_lowercase().as_str() {
            "majorityvote" => Ok(MultipleModelMethod::MajorityVote),
            "weightedmajorityvote" => Ok(MultipleModelMethod::WeightedMajorityVote),
            "average" => Ok(MultipleModelMethod::Average),
            "weightedaverage" => Ok(MultipleModelMethod::WeightedAverage),
            "sum" => Ok(MultipleModelMethod::Sum),
            "modelchain" => Ok(MultipleModelMethod::ModelChain),
            other => Err(ScoreError::Parsing(format!(
                "unsupported multiple-model method: {other}"
            ))),
        }
    }
}

/// One (predicate, weight, child-model) tuple.
#[derive(Debug)]
pub struct Segment {
    pub id: Option<String>,
    pub weight: f64,
    pub predicate: Predicate,
    pub model: Box<ModelElement>,
}

/// A segmented ensemble.
#[derive(Debug)]
pub struct EnsembleModel {
    mining_function: MiningFunction,
    method: MultipleModelMethod,
    segments: Vec<Segment>,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel_threshold: usize,
}

impl EnsembleModel {
    #[allow(clippy::too_many_arguments)]
    pub fn parse(
        element: &Element,
        mining_function: MiningFunction,
        dictionary: &DataDictionary,
        inherited: &TransformationDictionary,
        indexer: &mut FieldIndexer,
        interner: &StringInterner,
        config: &EngineConfig,
    ) -> Result<EnsembleModel> {
        let segmentation = element
            .child("Segmentation")
            .ok_or_else(|| ScoreError::Parsing("MiningModel has no Segmentation".to_string()))?;
        let method = MultipleModelMethod::from_name(required_attribute(
            segmentation,
            "multipleModelMethod",
        )?)?;

        let mut segments = Vec::new();
        for segment_element in segmentation.children("Segment") {
            let model_element = segment_element.child_in(MODEL_NAMES).ok_or_else(|| {
                ScoreError::Parsing("Segment has no supported model element".to_string())
            })?;
            let model = ModelElement::parse(
                model_element,
                dictionary,
                inherited,
                indexer,
                interner,
                config,
            )?;
            let predicate = PredicateBuilder::new(indexer, interner, config.set_threshold)
                .build(segment_element.child_in(PREDICATE_NAMES))?;
            segments.push(Segment {
                id: segment_element.attribute("id").map(str::to_string),
                weight: segment_element.double_attribute("weight").unwrap_or(1.0),
                predicate,
                model: Box::new(model),
            });
        }
        if segments.is_empty() {
            return Err(ScoreError::Parsing(
                "Segmentation has no Segment".to_string(),
            ));
        }

        Ok(EnsembleModel {
            mining_function,
            method,
            segments,
            parallel_threshold: config.parallel_segment_threshold,
        })
    }

    pub fn score(&self, sample: &Sample, interner: &StringInterner) -> Result<InternalScore> {
        match (self.method, self.mining_function) {
            (MultipleModelMethod::MajorityVote, _) => self.majority_vote(sample, interner, false),
            (MultipleModelMethod::WeightedMajorityVote, _) => {
                self.majority_vote(sample, interner, true)
            }
            (MultipleModelMethod::Average, MiningFunction::Classification) => {
                self.probability_average(sample, interner, false)
            }
            (MultipleModelMethod::WeightedAverage, MiningFunction::Classification) => {
                self.probability_average(sample, interner, true)
            }
            (MultipleModelMethod::Average, MiningFunction::Regression) => {
                self.regression_average(sample, interner, false)
            }
            (MultipleModelMethod::WeightedAverage, MiningFunction::Regression) => {
                self.regression_average(sample, interner, true)
            }
            (MultipleModelMethod::Sum, _) => self.sum(sample, interner),
            (MultipleModelMethod::ModelChain, _) => self.model_chain(sample, interner),
        }
    }

    /// Each matching segment votes for its predicted label with `1/N` (or
    /// `weight/N`). The winner is the first label past the threshold, else
    /// the argmax over non-empty labels.
    fn majority_vote(
        &self,
        sample: &Sample,
        interner: &StringInterner,
        weighted: bool,
    ) -> Result<InternalScore> {
        let count = self.segments.len() as f64;
        let mut votes: BTreeMap<String, f64> = BTreeMap::new();
        for (label, weight) in self.matching_labels(sample, interner)?.into_iter().flatten() {
            let contribution = if weighted { weight } else { 1.0 } / count;
            *votes.entry(label).or_insert(0.0) += contribution;
        }

        let threshold = if weighted {
            1.0 / self.segments[0].model.target_n_values as f64
        } else {
            0.5
        };
        let winner = pick_winner(&votes, threshold, false);
        Ok(InternalScore::with_distribution(winner, votes))
    }

    /// Average (or weighted-average) per-class probabilities across matching
    /// segments.
    fn probability_average(
        &self,
        sample: &Sample,
        interner: &StringInterner,
        weighted: bool,
    ) -> Result<InternalScore> {
        let mut probabilities: BTreeMap<String, f64> = BTreeMap::new();
        let mut total_weight = 0.0;
        for segment in &self.segments {
            if !segment.predicate.test(sample)? {
                continue;
            }
            let weight = if weighted { segment.weight } else { 1.0 };
            total_weight += weight;
            let score = segment.model.score_raw(sample, interner)?;
            for (label, probability) in score.probabilities {
                *probabilities.entry(label).or_insert(0.0) += probability * weight;
            }
        }
        if total_weight > 0.0 {
            for probability in probabilities.values_mut() {
                *probability /= total_weight;
            }
        }

        let threshold = if weighted {
            1.0 / self.segments[0].model.target_n_values as f64
        } else {
            1.0
        };
        let winner = pick_winner(&probabilities, threshold, true);
        Ok(InternalScore::with_distribution(winner, probabilities))
    }

    /// Mean (or weighted mean) of matching segments' predicted values.
    fn regression_average(
        &self,
        sample: &Sample,
        interner: &StringInterner,
        weighted: bool,
    ) -> Result<InternalScore> {
        let mut total = 0.0;
        let mut total_weight = 0.0;
        for (value, weight) in self.matching_scores(sample, interner)?.into_iter().flatten() {
            let weight = if weighted { weight } else { 1.0 };
            total += value * weight;
            total_weight += weight;
        }
        Ok(InternalScore::from_double(total / total_weight))
    }

    /// Arithmetic sum of matching segments' raw scores.
    fn sum(&self, sample: &Sample, interner: &StringInterner) -> Result<InternalScore> {
        let total = self
            .matching_scores(sample, interner)?
            .into_iter()
            .flatten()
            .map(|(value, _)| value)
            .sum();
        Ok(InternalScore::from_double(total))
    }

    /// Evaluate segments in order, augmenting the sample in place so later
    /// segments can reference earlier predictions by name; the last segment
    /// produces the score.
    fn model_chain(&self, sample: &Sample, interner: &StringInterner) -> Result<InternalScore> {
        let mut chained = sample.clone();
        let mut first = true;
        for segment in &self.segments[..self.segments.len() - 1] {
            if segment.predicate.test(&chained)? {
                if first {
                    segment.model.augment_first(&mut chained, interner)?;
                    first = false;
                } else {
                    segment.model.augment(&mut chained, interner)?;
                }
            }
        }

        let closing = &self.segments[self.segments.len() - 1];
        closing.model.augment_last(&mut chained, interner)
    }

    /// Predicted label and weight per matching segment.
    fn matching_labels(
        &self,
        sample: &Sample,
        interner: &StringInterner,
    ) -> Result<Vec<Option<(String, f64)>>> {
        let evaluate = |segment: &Segment| -> Result<Option<(String, f64)>> {
            if segment.predicate.test(sample)? {
                let label = segment.model.predict_raw(sample, interner)?.into_owned();
                Ok(Some((label, segment.weight)))
            } else {
                Ok(None)
            }
        };

        #[cfg(feature = "parallel")]
        if self.segments.len() > self.parallel_threshold {
            use rayon::prelude::*;
            return self.segments.par_iter().map(evaluate).collect();
        }

        self.segments.iter().map(evaluate).collect()
    }

    /// Raw double score and weight per matching segment.
    fn matching_scores(
        &self,
        sample: &Sample,
        interner: &StringInterner,
    ) -> Result<Vec<Option<(f64, f64)>>> {
        let evaluate = |segment: &Segment| -> Result<Option<(f64, f64)>> {
            if segment.predicate.test(sample)? {
                let score = segment.model.score_raw(sample, interner)?;
                Ok(Some((score.double_score, segment.weight)))
            } else {
                Ok(None)
            }
        };

        #[cfg(feature = "parallel")]
        if self.segments.len() > self.parallel_threshold {
            use rayon::prelude::*;
            return self.segments.par_iter().map(evaluate).collect();
        }

        self.segments.iter().map(evaluate).collect()
    }
}

/// Scan the accumulated votes in key order: stop at the first label past the
/// threshold, otherwise keep the argmax. Empty labels never win.
fn pick_winner(votes: &BTreeMap<String, f64>, threshold: f64, inclusive: bool) -> String {
    let mut winner = String::new();
    let mut max = 0.0;
    for (label, &vote) in votes {
        let past_threshold = if inclusive {
            max >= threshold
        } else {
            max > threshold
        };
        if past_threshold {
            break;
        }
        if vote > max && !label.is_empty() {
            max = vote;
            winner = label.clone();
        }
    }
    winner
}
