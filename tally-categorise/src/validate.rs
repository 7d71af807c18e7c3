//! Schema check for parsed replies.
//!
//! Runs once, straight after parsing: the reply must hold exactly one object
//! per row of the batch, each with an index and every required column, and
//! the indices must be the batch's own.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tally_core::FieldValue;

use crate::batch::Batch;
use crate::error::ValidationError;
use crate::INDEX;

/// One transaction's result from the model, field names normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRecord {
    pub index: usize,
    /// Every field except the index, keyed by normalised name
    pub fields: BTreeMap<String, FieldValue>,
}

/// Canonical field name: first letter upper-case, the rest lower-case.
pub fn normalise_field_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Validate a parsed reply against its batch and normalise it.
pub fn validate_records(
    records: Vec<Value>,
    batch: &Batch,
    return_columns: &[String],
) -> Result<Vec<ClassificationRecord>, ValidationError> {
    if records.len() != batch.len() {
        return Err(ValidationError::CountMismatch {
            range: batch.range(),
            expected: batch.len(),
            returned: records.len(),
            expected_indices: batch.expected_indices(),
            returned_items: Value::Array(records).to_string(),
        });
    }

    let mut out = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let Value::Object(map) = record else {
            return Err(ValidationError::NotAnObject { position });
        };
        let index = read_index(&map, position)?;

        for column in return_columns {
            if !map.keys().any(|k| k.eq_ignore_ascii_case(column)) {
                return Err(ValidationError::MissingColumn {
                    position,
                    column: column.clone(),
                });
            }
        }

        let fields = map
            .into_iter()
            .map(|(k, v)| (normalise_field_name(&k), FieldValue::from(v)))
            .filter(|(k, _)| k != INDEX)
            .collect();
        out.push(ClassificationRecord { index, fields });
    }

    // Every row of the batch exactly once, in any order
    let mut returned_indices: Vec<usize> = out.iter().map(|r| r.index).collect();
    returned_indices.sort_unstable();
    let expected_indices = batch.expected_indices();
    if returned_indices != expected_indices {
        return Err(ValidationError::IndexMismatch {
            range: batch.range(),
            expected_indices,
            returned_indices,
        });
    }
    Ok(out)
}

fn read_index(map: &Map<String, Value>, position: usize) -> Result<usize, ValidationError> {
    let value = map
        .get(INDEX)
        .or_else(|| map.get("index"))
        .ok_or(ValidationError::MissingIndex { position })?;

    let index = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    index
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| ValidationError::InvalidIndex {
            position,
            value: value.to_string(),
        })
}
