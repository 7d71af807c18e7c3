//! CSV statement tables.
//!
//! The first row is the header. Header names are trimmed; cells are inferred
//! with [`FieldValue::infer`] so amounts become numbers and blanks become null.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::Path;
use tally_core::{FieldValue, TransactionSet};
use tracing::debug;

/// Read a CSV file into a [`TransactionSet`], assigning indices in row order.
pub fn read_transactions_csv(path: impl AsRef<Path>) -> Result<TransactionSet> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let set = read_transactions_from(file).with_context(|| format!("parsing {}", path.display()))?;
    debug!(rows = set.len(), path = %path.display(), "loaded transactions");
    Ok(set)
}

pub fn read_transactions_from(reader: impl Read) -> Result<TransactionSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()
        .context("reading header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.iter().all(|c| c.is_empty()) {
        bail!("CSV has no header row");
    }

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("reading row {}", line + 1))?;
        // Short rows are padded with nulls
        let row: Vec<FieldValue> = (0..columns.len())
            .map(|i| record.get(i).map(FieldValue::infer).unwrap_or_default())
            .collect();
        rows.push(row);
    }

    Ok(TransactionSet::from_rows(columns, rows))
}

/// Write every column of the set, in schema order, to a CSV file.
pub fn write_transactions_csv(set: &TransactionSet, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_transactions_to(set, file).with_context(|| format!("write {}", path.display()))
}

pub fn write_transactions_to(set: &TransactionSet, writer: impl Write) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(set.columns())?;
    for txn in set.rows() {
        wtr.write_record(set.columns().iter().map(|c| txn.get(c).to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT: &str = "\
Date,Name,Amount,Notes and #tags
01/03/2025,Tesco Express,-23.40,
02/03/2025,Uber,-9.10,ride home
03/03/2025,Salary,2500,
";

    #[test]
    fn test_read_statement() {
        let set = read_transactions_from(STATEMENT.as_bytes()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.columns(), &["Date", "Name", "Amount", "Notes and #tags"]);

        let first = &set.rows()[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.get("Amount"), &FieldValue::Number(-23.4));
        assert!(first.get("Notes and #tags").is_null());
        assert_eq!(set.rows()[1].get("Notes and #tags"), &FieldValue::text("ride home"));
    }

    #[test]
    fn test_short_rows_padded() {
        let set = read_transactions_from("Name,Amount\nTesco\n".as_bytes()).unwrap();
        assert!(set.rows()[0].get("Amount").is_null());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut set = read_transactions_from(STATEMENT.as_bytes()).unwrap();
        set.assign(0, "Category", "Food".into());
        write_transactions_csv(&set, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Date,Name,Amount,Notes and #tags,Category"));
        assert_eq!(lines.next(), Some("01/03/2025,Tesco Express,-23.4,,Food"));

        let back = read_transactions_csv(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.rows()[0].get("Category"), &FieldValue::text("Food"));
        assert!(back.rows()[2].get("Category").is_null());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_transactions_csv("/definitely/not/here.csv").unwrap_err();
        assert!(err.to_string().contains("opening"));
    }
}
