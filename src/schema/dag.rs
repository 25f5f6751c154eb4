//! Dependency ordering of derived fields.
//!
//! PMML makes no ordering promise between data fields and derived fields, so
//! the evaluation order is a topological sort of the dependency graph: each
//! derived field is computed after its inputs. A field whose inputs cannot be
//! resolved - transitively - from the mining schema or other derived fields
//! is pruned and never scheduled. Ties keep document order; documents rely on
//! stable evaluation order.

use std::collections::HashMap;

use tracing::warn;

use super::{MiningSchema, TransformationDictionary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Emitted,
    Pruned,
}

/// Evaluation order over the derived fields: every reachable field exactly
/// once, each after all of its derived inputs.
pub fn derived_field_order(
    mining_schema: &MiningSchema,
    transformations: &TransformationDictionary,
) -> Vec<String> {
    let mut states: HashMap<String, VisitState> = HashMap::new();
    let mut order = Vec::new();

    for field in transformations.fields() {
        visit(&field.name, mining_schema, transformations, &mut states, &mut order);
    }

    order
}

fn visit(
    name: &str,
    mining_schema: &MiningSchema,
    transformations: &TransformationDictionary,
    states: &mut HashMap<String, VisitState>,
    order: &mut Vec<String>,
) -> VisitState {
    if let Some(&state) = states.get(name) {
        return state;
    }
    states.insert(name.to_string(), VisitState::InProgress);

    let field = match transformations.get(name) {
        Some(field) => field,
        None => return prune(name, states),
    };

    for input in &field.expression.inputs {
        if transformations.contains(input) {
            match visit(input, mining_schema, transformations, states, order) {
                VisitState::Emitted => {}
                // pruned input, or a dependency cycle through this field
                VisitState::Pruned | VisitState::InProgress => return prune(name, states),
            }
        } else if !mining_schema.contains(input) {
            return prune(name, states);
        }
    }

    states.insert(name.to_string(), VisitState::Emitted);
    order.push(name.to_string());
    VisitState::Emitted
}

fn prune(name: &str, states: &mut HashMap<String, VisitState>) -> VisitState {
    warn!(field = name, "pruning derived field with unresolvable inputs");
    states.insert(name.to_string(), VisitState::Pruned);
    VisitState::Pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::indexer::FieldIndexer;
    use crate::schema::DataDictionary;
    use crate::value::StringInterner;
    use crate::xml::Element;

    fn fixtures(transform_xml: &str) -> (MiningSchema, TransformationDictionary) {
        let mut indexer = FieldIndexer::new();
        let interner = StringInterner::new(false);
        let dictionary = DataDictionary::parse(
            &Element::parse(
                r#"<DataDictionary>
                     <DataField name="a" dataType="double" optype="continuous"/>
                     <DataField name="b" dataType="double" optype="continuous"/>
                   </DataDictionary>"#,
            )
            .unwrap(),
            &mut indexer,
            &interner,
            &EngineConfig::default(),
        )
        .unwrap();
        let schema = MiningSchema::parse(
            &Element::parse(
                r#"<MiningSchema>
                     <MiningField name="a"/>
                     <MiningField name="b"/>
                   </MiningSchema>"#,
            )
            .unwrap(),
            &dictionary,
            &interner,
        )
        .unwrap();
        let transformations = TransformationDictionary::parse(
            &Element::parse(transform_xml).unwrap(),
            &mut indexer,
            &interner,
        )
        .unwrap();
        (schema, transformations)
    }

    #[test]
    fn dependencies_precede_dependents() {
        // declared out of order: d2 reads d1
        let (schema, transformations) = fixtures(
            r#"<TransformationDictionary>
                 <DerivedField name="d2" dataType="double" optype="continuous">
                   <Apply function="+"><FieldRef field="d1"/><Constant>1</Constant></Apply>
                 </DerivedField>
                 <DerivedField name="d1" dataType="double" optype="continuous">
                   <FieldRef field="a"/>
                 </DerivedField>
               </TransformationDictionary>"#,
        );
        assert_eq!(
            derived_field_order(&schema, &transformations),
            vec!["d1", "d2"]
        );
    }

    #[test]
    fn unresolvable_chains_are_pruned_transitively() {
        let (schema, transformations) = fixtures(
            r#"<TransformationDictionary>
                 <DerivedField name="broken" dataType="double" optype="continuous">
                   <FieldRef field="ghost"/>
                 </DerivedField>
                 <DerivedField name="downstream" dataType="double" optype="continuous">
                   <FieldRef field="broken"/>
                 </DerivedField>
                 <DerivedField name="ok" dataType="double" optype="continuous">
                   <FieldRef field="b"/>
                 </DerivedField>
               </TransformationDictionary>"#,
        );
        assert_eq!(derived_field_order(&schema, &transformations), vec!["ok"]);
    }

    #[test]
    fn ties_keep_document_order() {
        let (schema, transformations) = fixtures(
            r#"<TransformationDictionary>
                 <DerivedField name="z" dataType="double" optype="continuous">
                   <FieldRef field="a"/>
                 </DerivedField>
                 <DerivedField name="m" dataType="double" optype="continuous">
                   <FieldRef field="a"/>
                 </DerivedField>
               </TransformationDictionary>"#,
        );
        assert_eq!(
            derived_field_order(&schema, &transformations),
            vec!["z", "m"]
        );
    }

    #[test]
    fn cycles_are_pruned() {
        let (schema, transformations) = fixtures(
            r#"<TransformationDictionary>
                 <DerivedField name="left" dataType="double" optype="continuous">
                   <FieldRef field="right"/>
                 </DerivedField>
                 <DerivedField name="right" dataType="double" optype="continuous">
                   <FieldRef field="left"/>
                 </DerivedField>
               </TransformationDictionary>"#,
        );
        assert!(derived_field_order(&schema, &transformations).is_empty());
    }
}
