//! Prefix-tree table for MapValues.
//!
//! An inline table keyed by N input columns, stored as a prefix tree with a
//! hash-map child level per column. Lookup cost is linear in the number of
//! columns, independent of the number of rows.

use std::collections::HashMap;

use crate::value::{Value, ValueKey};

#[derive(Debug, Clone, Default)]
struct TreeTableNode {
    value: Option<Value>,
    children: HashMap<ValueKey, TreeTableNode>,
}

/// Table over value-sequence keys.
#[derive(Debug, Clone, Default)]
pub struct TreeTable {
    root: TreeTableNode,
}

impl TreeTable {
    pub fn new() -> Self {
        TreeTable::default()
    }

    /// Insert a row; later inserts with the same keys overwrite.
    pub fn add(&mut self, keys: &[Value], value: Value) {
        let mut node = &mut self.root;
        for key in keys {
            node = node.children.entry(ValueKey::from(key)).or_default();
        }
        node.value = Some(value);
    }

    /// Walk the key path; `None` when any level is absent.
    pub fn get(&self, keys: &[Value]) -> Option<&Value> {
        let mut node = &self.root;
        for key in keys {
            node = node.children.get(&ValueKey::from(key))?;
        }
        node.value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_key_path() {
        let mut table = TreeTable::new();
        table.add(
            &[Value::number(1.0), Value::number(2.0)],
            Value::number(10.0),
        );
        table.add(
            &[Value::number(1.0), Value::number(3.0)],
            Value::number(20.0),
        );

        assert_eq!(
            table
                .get(&[Value::number(1.0), Value::number(2.0)])
                .unwrap()
                .number,
            10.0
        );
        assert_eq!(
            table
                .get(&[Value::number(1.0), Value::number(3.0)])
                .unwrap()
                .number,
            20.0
        );
        assert!(table
            .get(&[Value::number(1.0), Value::number(4.0)])
            .is_none());
        assert!(table.get(&[Value::number(9.0)]).is_none());
    }
}
