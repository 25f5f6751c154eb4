//! Field indexing.
//!
//! Every field name seen during parsing gets a dense integer slot and a data
//! type tag, so that all later field access is an array index instead of a
//! map lookup. Name and index are a bijection for the loaded model.

use std::collections::HashMap;

use crate::error::{Result, ScoreError};
use crate::value::DataType;

/// Bidirectional name/index map plus per-field type tags.
#[derive(Debug, Default)]
pub struct FieldIndexer {
    name_index: HashMap<String, usize>,
    index_name: Vec<String>,
    types: Vec<Option<DataType>>,
}

impl FieldIndexer {
    pub fn new() -> Self {
        FieldIndexer::default()
    }

    /// Slot for `name`, assigning the next free index on first sight.
    pub fn get_or_set(&mut self, name: &str) -> usize {
        if let Some(&index) = self.name_index.get(name) {
            return index;
        }
        let index = self.index_name.len();
        self.name_index.insert(name.to_string(), index);
        self.index_name.push(name.to_string());
        self.types.push(None);
        index
    }

    /// Slot and type for `name`. Assigns the type only if it was previously
    /// unset; an already-typed field keeps its type.
    pub fn get_or_set_typed(&mut self, name: &str, datatype: DataType) -> (usize, DataType) {
        let index = self.get_or_set(name);
        match self.types[index] {
            Some(existing) => (index, existing),
            None => {
                self.types[index] = Some(datatype);
                (index, datatype)
            }
        }
    }

    /// Strict lookup; unknown names are a missing-value error.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.name_index
            .get(name)
            .copied()
            .ok_or_else(|| ScoreError::MissingValue(format!("unknown field: {name}")))
    }

    /// Strict type lookup; untyped or unknown names are a missing-value error.
    pub fn type_of(&self, name: &str) -> Result<DataType> {
        let index = self.index_of(name)?;
        self.types[index]
            .ok_or_else(|| ScoreError::MissingValue(format!("field has no declared type: {name}")))
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.index_name.get(index).map(String::as_str)
    }

    pub fn type_of_index(&self, index: usize) -> Option<DataType> {
        self.types.get(index).copied().flatten()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.index_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_name.is_empty()
    }

    /// Collision-free synthetic field name. Used when the mining schema has
    /// no declared target, to give the predicted value a slot.
    pub fn synthetic_name(&self) -> String {
        let mut counter = 0usize;
        loop {
            let candidate = format!("__predicted_{counter}");
            if !self.name_index.contains_key(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}
