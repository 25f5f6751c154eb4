//! Decision-tree scoring tests.
//!
//! Tests for:
//! - End-to-end classification on a small iris tree
//! - Leaf score distributions
//! - No-true-child strategies
//! - Surrogate predicates over missing inputs
//! - Determinism and shared concurrent scoring

use std::collections::HashMap;
use std::io::Write;

use pmml_score::Model;
use tempfile::TempDir;

fn load_model(xml: &str) -> Model {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("model.pmml");
    std::fs::File::create(&path)
        .and_then(|mut file| file.write_all(xml.as_bytes()))
        .expect("write model document");
    Model::load(&path, false).expect("load model")
}

fn iris_sample() -> HashMap<String, String> {
    HashMap::from([
        ("sepal_length".to_string(), "6.6".to_string()),
        ("sepal_width".to_string(), "2.9".to_string()),
        ("petal_length".to_string(), "4.6".to_string()),
        ("petal_width".to_string(), "1.3".to_string()),
    ])
}

const IRIS_TREE: &str = r#"<?xml version="1.0"?>
<PMML version="4.4">
  <Header copyright="test" description="iris decision tree"/>
  <DataDictionary numberOfFields="5">
    <DataField name="sepal_length" dataType="double" optype="continuous"/>
    <DataField name="sepal_width" dataType="double" optype="continuous"/>
    <DataField name="petal_length" dataType="double" optype="continuous"/>
    <DataField name="petal_width" dataType="double" optype="continuous"/>
    <DataField name="species" dataType="string" optype="categorical">
      <Value value="Iris-setosa"/>
      <Value value="Iris-versicolor"/>
      <Value value="Iris-virginica"/>
    </DataField>
  </DataDictionary>
  <TreeModel functionName="classification" noTrueChildStrategy="returnNullPrediction">
    <MiningSchema>
      <MiningField name="sepal_length"/>
      <MiningField name="sepal_width"/>
      <MiningField name="petal_length"/>
      <MiningField name="petal_width"/>
      <MiningField name="species" usageType="target"/>
    </MiningSchema>
    <Node>
      <True/>
      <Node score="Iris-setosa">
        <SimplePredicate field="petal_width" operator="lessThan" value="0.8"/>
        <ScoreDistribution value="Iris-setosa" recordCount="50"/>
        <ScoreDistribution value="Iris-versicolor" recordCount="0"/>
        <ScoreDistribution value="Iris-virginica" recordCount="0"/>
      </Node>
      <Node>
        <SimplePredicate field="petal_width" operator="greaterOrEqual" value="0.8"/>
        <Node score="Iris-versicolor">
          <SimplePredicate field="petal_length" operator="lessThan" value="4.9"/>
          <ScoreDistribution value="Iris-setosa" recordCount="0"/>
          <ScoreDistribution value="Iris-versicolor" recordCount="48"/>
          <ScoreDistribution value="Iris-virginica" recordCount="2"/>
        </Node>
        <Node score="Iris-virginica">
          <SimplePredicate field="petal_length" operator="greaterOrEqual" value="4.9"/>
          <ScoreDistribution value="Iris-setosa" recordCount="0"/>
          <ScoreDistribution value="Iris-versicolor" recordCount="4"/>
          <ScoreDistribution value="Iris-virginica" recordCount="46"/>
        </Node>
      </Node>
    </Node>
  </TreeModel>
</PMML>"#;

#[test]
fn iris_tree_classifies_versicolor() {
    let model = load_model(IRIS_TREE);
    let prediction = model.score(&iris_sample()).unwrap();

    assert_eq!(prediction.as_string(), "Iris-versicolor");
    assert_eq!(model.predict(&iris_sample()).unwrap(), "Iris-versicolor");

    let sum: f64 = prediction.distribution().values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
    assert_eq!(prediction.distribution()["Iris-versicolor"], 48.0 / 50.0);
}

#[test]
fn score_and_predict_agree_across_paths() {
    let model = load_model(IRIS_TREE);
    for (petal_width, petal_length, expected) in [
        ("0.2", "1.4", "Iris-setosa"),
        ("1.3", "4.6", "Iris-versicolor"),
        ("2.1", "5.8", "Iris-virginica"),
    ] {
        let mut sample = iris_sample();
        sample.insert("petal_width".to_string(), petal_width.to_string());
        sample.insert("petal_length".to_string(), petal_length.to_string());
        assert_eq!(model.score(&sample).unwrap().as_string(), expected);
        assert_eq!(model.predict(&sample).unwrap(), expected);
    }
}

#[test]
fn repeated_scoring_is_deterministic() {
    let model = load_model(IRIS_TREE);
    let first = model.score(&iris_sample()).unwrap();
    for _ in 0..10 {
        let next = model.score(&iris_sample()).unwrap();
        assert_eq!(next.as_string(), first.as_string());
        assert_eq!(next.distribution(), first.distribution());
    }
}

#[test]
fn concurrent_scorers_share_the_model() {
    let model = load_model(IRIS_TREE);
    let expected = model.score(&iris_sample()).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let prediction = model.score(&iris_sample()).unwrap();
                    assert_eq!(prediction.as_string(), expected.as_string());
                    assert_eq!(prediction.distribution(), expected.distribution());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    });
}

#[test]
fn missing_branch_input_is_a_missing_value_error() {
    let model = load_model(IRIS_TREE);
    let mut sample = iris_sample();
    sample.remove("petal_width");
    assert!(matches!(
        model.score(&sample),
        Err(pmml_score::ScoreError::MissingValue(_))
    ));
}

fn strategy_tree(strategy: &str) -> String {
    format!(
        r#"<PMML version="4.4">
  <DataDictionary numberOfFields="2">
    <DataField name="x" dataType="double" optype="continuous"/>
    <DataField name="label" dataType="string" optype="categorical"/>
  </DataDictionary>
  <TreeModel functionName="classification" noTrueChildStrategy="{strategy}">
    <MiningSchema>
      <MiningField name="x"/>
      <MiningField name="label" usageType="target"/>
    </MiningSchema>
    <Node score="fallback">
      <True/>
      <Node score="negative">
        <SimplePredicate field="x" operator="lessThan" value="0"/>
      </Node>
    </Node>
  </TreeModel>
</PMML>"#
    )
}

#[test]
fn no_true_child_at_root_honors_the_strategy() {
    let sample = HashMap::from([("x".to_string(), "7".to_string())]);

    let model = load_model(&strategy_tree("returnLastPrediction"));
    assert_eq!(model.score(&sample).unwrap().as_string(), "fallback");

    let model = load_model(&strategy_tree("returnNullPrediction"));
    let prediction = model.score(&sample).unwrap();
    assert!(prediction.is_empty());
    assert_eq!(prediction.as_string(), "");
}

#[test]
fn surrogate_predicate_falls_through_missing_children() {
    let model = load_model(
        r#"<PMML version="4.4">
  <DataDictionary numberOfFields="3">
    <DataField name="a" dataType="double" optype="continuous"/>
    <DataField name="b" dataType="double" optype="continuous"/>
    <DataField name="label" dataType="string" optype="categorical"/>
  </DataDictionary>
  <TreeModel functionName="classification" noTrueChildStrategy="returnNullPrediction">
    <MiningSchema>
      <MiningField name="a"/>
      <MiningField name="b"/>
      <MiningField name="label" usageType="target"/>
    </MiningSchema>
    <Node>
      <True/>
      <Node score="hit">
        <CompoundPredicate booleanOperator="surrogate">
          <SimplePredicate field="a" operator="greaterThan" value="0"/>
          <SimplePredicate field="b" operator="greaterThan" value="0"/>
        </CompoundPredicate>
      </Node>
    </Node>
  </TreeModel>
</PMML>"#,
    );

    // `a` missing: the surrogate consults `b` instead
    let sample = HashMap::from([("b".to_string(), "3".to_string())]);
    assert_eq!(model.score(&sample).unwrap().as_string(), "hit");

    // both missing: the error surfaces
    assert!(matches!(
        model.score(&HashMap::new()),
        Err(pmml_score::ScoreError::MissingValue(_))
    ));
}
