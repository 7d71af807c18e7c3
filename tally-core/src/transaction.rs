//! Transactions and the ordered table that holds them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::FieldValue;

static NULL: FieldValue = FieldValue::Null;

/// One financial record, keyed by a stable index assigned at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identifier, never reused within a run
    pub index: usize,
    fields: BTreeMap<String, FieldValue>,
}

impl Transaction {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            fields: BTreeMap::new(),
        }
    }

    /// Value of a field; missing fields read as null.
    pub fn get(&self, column: &str) -> &FieldValue {
        self.fields.get(column).unwrap_or(&NULL)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn set(&mut self, column: &str, value: FieldValue) {
        self.fields.insert(column.to_string(), value);
    }

    fn remove(&mut self, column: &str) {
        self.fields.remove(column);
    }
}

/// An ordered set of transactions plus the externally visible column order.
///
/// Row order is the original load order and is never changed by categorisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionSet {
    columns: Vec<String>,
    rows: Vec<Transaction>,
}

impl TransactionSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a set from positional rows; row `i` gets index `i`.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Self {
        let mut set = Self::new(columns);
        for row in rows {
            let pairs: Vec<(String, FieldValue)> =
                set.columns.iter().cloned().zip(row).collect();
            set.push_row(pairs);
        }
        set
    }

    /// Append a row, registering any unseen column. Returns the new index.
    pub fn push_row(&mut self, values: impl IntoIterator<Item = (String, FieldValue)>) -> usize {
        let index = self.rows.last().map(|t| t.index + 1).unwrap_or(0);
        let mut txn = Transaction::new(index);
        for (column, value) in values {
            self.add_column(&column);
            txn.set(&column, value);
        }
        self.rows.push(txn);
        index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Register a column at the end of the schema if it is not already there.
    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    /// Remove columns from the schema and from every row. Unknown names are ignored.
    pub fn drop_columns<S: AsRef<str>>(&mut self, columns: &[S]) {
        for column in columns {
            let column = column.as_ref();
            self.columns.retain(|c| c != column);
            for row in &mut self.rows {
                row.remove(column);
            }
        }
    }

    /// Set one field of the row at `position`, adding the column when needed.
    pub fn assign(&mut self, position: usize, column: &str, value: FieldValue) {
        self.add_column(column);
        if let Some(row) = self.rows.get_mut(position) {
            row.set(column, value);
        }
    }

    /// Values of one column in row order.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a FieldValue> + 'a {
        self.rows.iter().map(move |t| t.get(column))
    }
}
