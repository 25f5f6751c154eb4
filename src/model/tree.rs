//! Decision-tree models.
//!
//! A tree of nodes, each carrying a predicate, an optional score, and an
//! optional score distribution. Evaluation walks from the root, descending
//! into the first child whose predicate holds; a null prediction from a
//! subtree sends the walk back to the remaining siblings.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::{Result, ScoreError};
use crate::indexer::FieldIndexer;
use crate::predicate::{Predicate, PredicateBuilder};
use crate::sample::Sample;
use crate::value::StringInterner;
use crate::xml::Element;

use super::InternalScore;

const PREDICATE_NAMES: &[&str] = &[
    "SimplePredicate",
    "SimpleSetPredicate",
    "CompoundPredicate",
    "True",
    "False",
];

/// One tree node.
#[derive(Debug)]
struct Node {
    score: Option<String>,
    children: Vec<Node>,
    predicate: Predicate,
    /// Per-class probabilities from the node's ScoreDistribution, normalized
    /// by the total record count.
    distribution: BTreeMap<String, f64>,
}

impl Node {
    fn parse(element: &Element, builder: &PredicateBuilder<'_>) -> Result<Node> {
        let mut children = Vec::new();
        for child in element.children("Node") {
            children.push(Node::parse(child, builder)?);
        }

        let mut totals: Vec<(String, f64)> = Vec::new();
        for distribution in element.children("ScoreDistribution") {
            let value = crate::predicate::required_attribute(distribution, "value")?;
            let count = distribution
                .double_attribute("recordCount")
                .ok_or_else(|| {
                    ScoreError::Parsing(
                        "ScoreDistribution is missing required attribute recordCount".to_string(),
                    )
                })?;
            totals.push((value.to_string(), count));
        }
        let total: f64 = totals.iter().map(|(_, count)| count).sum();
        let distribution = totals
            .into_iter()
            .map(|(value, count)| (value, count / total))
            .collect();

        Ok(Node {
            score: element.attribute("score").map(str::to_string),
            children,
            predicate: builder.build(element.child_in(PREDICATE_NAMES))?,
            distribution,
        })
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A decision-tree model (classification or regression).
#[derive(Debug)]
pub struct TreeModel {
    root: Node,
    return_last_prediction: bool,
}

impl TreeModel {
    pub fn parse(
        element: &Element,
        indexer: &FieldIndexer,
        interner: &StringInterner,
        config: &EngineConfig,
    ) -> Result<TreeModel> {
        let builder = PredicateBuilder::new(indexer, interner, config.set_threshold);
        let root_element = element
            .child("Node")
            .ok_or_else(|| ScoreError::Parsing("TreeModel has no root Node".to_string()))?;

        Ok(TreeModel {
            root: Node::parse(root_element, &builder)?,
            return_last_prediction: element.attribute("noTrueChildStrategy")
                == Some("returnLastPrediction"),
        })
    }

    /// Full evaluation: winning label plus the leaf's distribution.
    pub fn score(&self, sample: &Sample) -> Result<InternalScore> {
        match self.navigate(&self.root, sample)? {
            Some(node) => Ok(InternalScore::with_distribution(
                node.score.clone().unwrap_or_default(),
                node.distribution.clone(),
            )),
            None => Ok(InternalScore::empty()),
        }
    }

    /// Fast path: identical navigation, borrowed label payload.
    pub fn predict(&self, sample: &Sample) -> Result<Cow<'_, str>> {
        match self.navigate(&self.root, sample)? {
            Some(node) => Ok(Cow::Borrowed(node.score.as_deref().unwrap_or_default())),
            None => Ok(Cow::Borrowed("")),
        }
    }

    /// Walk the tree; `None` is the null prediction, which the caller maps
    /// per the no-true-child strategy.
    fn navigate<'n>(&'n self, node: &'n Node, sample: &Sample) -> Result<Option<&'n Node>> {
        if node.is_leaf() {
            return Ok(Some(node));
        }

        for child in &node.children {
            if child.predicate.test(sample)? {
                // a null prediction below keeps the remaining siblings in play
                if let Some(hit) = self.navigate(child, sample)? {
                    return Ok(Some(hit));
                }
            }
        }

        if self.return_last_prediction {
            Ok(Some(node))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn tree(xml: &str, strategy: &str) -> (TreeModel, FieldIndexer, StringInterner) {
        let mut indexer = FieldIndexer::new();
        indexer.get_or_set_typed("x", crate::value::DataType::Double);
        let interner = StringInterner::new(false);
        let element = Element::parse(&xml.replace("{strategy}", strategy)).unwrap();
        let model = TreeModel::parse(&element, &indexer, &interner, &EngineConfig::default())
            .unwrap();
        (model, indexer, interner)
    }

    const NO_MATCH_TREE: &str = r#"
        <TreeModel functionName="classification" noTrueChildStrategy="{strategy}">
          <Node score="root">
            <True/>
            <Node score="low">
              <SimplePredicate field="x" operator="lessThan" value="0"/>
            </Node>
          </Node>
        </TreeModel>"#;

    #[test]
    fn no_matching_child_returns_last_prediction() {
        let (model, indexer, _) = tree(NO_MATCH_TREE, "returnLastPrediction");
        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(5.0));
        let score = model.score(&sample).unwrap();
        assert_eq!(score.score, "root");
        assert_eq!(model.predict(&sample).unwrap(), "root");
    }

    #[test]
    fn no_matching_child_returns_null_prediction() {
        let (model, indexer, _) = tree(NO_MATCH_TREE, "returnNullPrediction");
        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(5.0));
        let score = model.score(&sample).unwrap();
        assert!(score.empty);
        assert_eq!(model.predict(&sample).unwrap(), "");
    }

    #[test]
    fn null_prediction_backtracks_to_siblings() {
        // the first child matches but its subtree dead-ends; the second
        // child must still win
        let (model, indexer, _) = tree(
            r#"<TreeModel functionName="classification" noTrueChildStrategy="{strategy}">
                 <Node>
                   <True/>
                   <Node>
                     <SimplePredicate field="x" operator="greaterThan" value="0"/>
                     <Node score="dead">
                       <SimplePredicate field="x" operator="lessThan" value="0"/>
                     </Node>
                   </Node>
                   <Node score="winner">
                     <SimplePredicate field="x" operator="greaterThan" value="1"/>
                   </Node>
                 </Node>
               </TreeModel>"#,
            "returnNullPrediction",
        );
        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(5.0));
        assert_eq!(model.score(&sample).unwrap().score, "winner");
    }

    #[test]
    fn leaf_distribution_is_normalized() {
        let (model, indexer, _) = tree(
            r#"<TreeModel functionName="classification" noTrueChildStrategy="{strategy}">
                 <Node>
                   <True/>
                   <Node score="a">
                     <SimplePredicate field="x" operator="greaterOrEqual" value="0"/>
                     <ScoreDistribution value="a" recordCount="30"/>
                     <ScoreDistribution value="b" recordCount="10"/>
                   </Node>
                 </Node>
               </TreeModel>"#,
            "returnNullPrediction",
        );
        let mut sample = Sample::new(indexer.len());
        sample.set(0, Value::number(1.0));
        let score = model.score(&sample).unwrap();
        assert_eq!(score.probabilities.get("a"), Some(&0.75));
        assert_eq!(score.probabilities.get("b"), Some(&0.25));
    }

    #[test]
    fn missing_branch_field_propagates() {
        let (model, indexer, _) = tree(NO_MATCH_TREE, "returnLastPrediction");
        let sample = Sample::new(indexer.len());
        assert!(matches!(
            model.score(&sample),
            Err(ScoreError::MissingValue(_))
        ));
    }
}
