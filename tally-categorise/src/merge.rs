//! Fold validated records back into the transaction set by index.

use std::collections::HashMap;
use tally_core::TransactionSet;
use tracing::debug;

use crate::validate::{normalise_field_name, ClassificationRecord};

/// Left-join `records` onto `set` by transaction index.
///
/// The configured return columns are dropped first so no stale value survives;
/// rows without a record read as null. Other fields a record carries become new
/// columns, unless the set already has a column of that name: dataset columns
/// are never overwritten. Row order is untouched. Merging the same records
/// again gives the same table.
pub fn merge_records(
    mut set: TransactionSet,
    mut records: Vec<ClassificationRecord>,
    return_columns: &[String],
) -> TransactionSet {
    records.sort_by_key(|r| r.index);

    let mut returned: Vec<String> = Vec::new();
    for name in return_columns.iter().map(|c| normalise_field_name(c)) {
        if !returned.contains(&name) {
            returned.push(name);
        }
    }
    set.drop_columns(return_columns);
    set.drop_columns(&returned);

    // Extra fields, as first seen by index; names already in the set are shadowed
    let mut writable = returned;
    let mut shadowed: Vec<&str> = Vec::new();
    for name in records.iter().flat_map(|r| r.fields.keys()) {
        if writable.contains(name) || shadowed.contains(&name.as_str()) {
            continue;
        }
        if set.has_column(name) {
            shadowed.push(name);
        } else {
            writable.push(name.clone());
        }
    }
    if !shadowed.is_empty() {
        debug!(?shadowed, "record fields matching dataset columns were ignored");
    }
    for column in &writable {
        set.add_column(column);
    }

    let positions: HashMap<usize, usize> = set
        .rows()
        .iter()
        .enumerate()
        .map(|(pos, t)| (t.index, pos))
        .collect();

    for record in &records {
        let Some(&pos) = positions.get(&record.index) else {
            debug!(index = record.index, "no transaction for record; ignored");
            continue;
        };
        for (name, value) in &record.fields {
            if writable.contains(name) {
                set.assign(pos, name, value.clone());
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tally_core::FieldValue;

    fn set() -> TransactionSet {
        let mut set = TransactionSet::from_rows(
            vec!["Name".into(), "Amount".into()],
            vec![
                vec!["Tesco".into(), (-10.0).into()],
                vec!["EDF".into(), (-60.0).into()],
                vec!["Uber".into(), (-8.0).into()],
            ],
        );
        set.assign(1, "Category", "Stale".into());
        set.assign(1, "Subcategory", "Rules".into());
        set
    }

    fn record(index: usize, category: &str, confidence: f64) -> ClassificationRecord {
        let mut fields = BTreeMap::new();
        fields.insert("Category".to_string(), FieldValue::text(category));
        fields.insert("Confidence".to_string(), FieldValue::Number(confidence));
        ClassificationRecord { index, fields }
    }

    fn cols() -> Vec<String> {
        vec!["Category".into(), "Confidence".into()]
    }

    #[test]
    fn test_left_join_by_index() {
        // Completion order is irrelevant
        let records = vec![record(2, "Transport", 0.8), record(0, "Food", 0.9)];
        let out = merge_records(set(), records, &cols());

        assert_eq!(out.columns(), &["Name", "Amount", "Subcategory", "Category", "Confidence"]);
        assert_eq!(out.len(), 3);
        assert_eq!(out.rows()[0].get("Category"), &FieldValue::text("Food"));
        assert_eq!(out.rows()[2].get("Confidence"), &FieldValue::Number(0.8));
        // Row 1 had no record: its stale category is gone, other columns stay
        assert!(out.rows()[1].get("Category").is_null());
        assert_eq!(out.rows()[1].get("Subcategory"), &FieldValue::text("Rules"));
        assert!(!out.has_column("Index"));
    }

    #[test]
    fn test_echoed_dataset_fields_are_ignored() {
        let mut first = record(0, "Food", 0.9);
        first.fields.insert("Name".into(), FieldValue::text("TESCO STORES"));
        let mut second = record(1, "Bills", 0.7);
        second.fields.insert("Amount".into(), FieldValue::Number(999.0));
        second.fields.insert("Subcategory".into(), FieldValue::text("Energy"));
        let out = merge_records(set(), vec![first, second], &cols());

        assert_eq!(out.columns(), &["Name", "Amount", "Subcategory", "Category", "Confidence"]);
        assert_eq!(out.rows()[0].get("Name"), &FieldValue::text("Tesco"));
        assert_eq!(out.rows()[0].get("Amount"), &FieldValue::Number(-10.0));
        assert_eq!(out.rows()[1].get("Name"), &FieldValue::text("EDF"));
        assert_eq!(out.rows()[1].get("Amount"), &FieldValue::Number(-60.0));
        assert_eq!(out.rows()[1].get("Subcategory"), &FieldValue::text("Rules"));
        assert_eq!(out.rows()[1].get("Category"), &FieldValue::text("Bills"));
    }

    #[test]
    fn test_new_record_fields_become_columns() {
        let mut rec = record(2, "Transport", 0.8);
        rec.fields.insert("Reason".into(), FieldValue::text("ride share"));
        let out = merge_records(set(), vec![rec.clone()], &cols());
        assert_eq!(out.columns().last().map(String::as_str), Some("Reason"));
        assert_eq!(out.rows()[2].get("Reason"), &FieldValue::text("ride share"));
        assert!(out.rows()[0].get("Reason").is_null());

        let again = merge_records(out.clone(), vec![rec], &cols());
        assert_eq!(out, again);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let records = vec![record(0, "Food", 0.9), record(1, "Bills", 0.7), record(2, "Transport", 0.8)];
        let once = merge_records(set(), records.clone(), &cols());
        let twice = merge_records(once.clone(), records, &cols());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_index_ignored() {
        let out = merge_records(set(), vec![record(99, "Food", 0.5)], &cols());
        assert_eq!(out.len(), 3);
        assert!(out.column_values("Category").all(FieldValue::is_null));
    }
}
