//! Splitting a transaction set into fixed-size batches.

use std::fmt;
use tally_core::{Transaction, TransactionSet};

/// First and last transaction index covered by a batch, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub first: usize,
    pub last: usize,
}

impl fmt::Display for BatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// A contiguous slice of the set, owned by the worker that processes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of this batch in submission order
    pub number: usize,
    pub rows: Vec<Transaction>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn range(&self) -> BatchRange {
        BatchRange {
            first: self.rows.first().map(|t| t.index).unwrap_or(0),
            last: self.rows.last().map(|t| t.index).unwrap_or(0),
        }
    }

    pub fn expected_indices(&self) -> Vec<usize> {
        self.rows.iter().map(|t| t.index).collect()
    }
}

/// Partition the set into batches of at most `batch_size` rows, in order.
///
/// A `batch_size` of zero is treated as one.
pub fn partition(set: &TransactionSet, batch_size: usize) -> Vec<Batch> {
    set.rows()
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(number, rows)| Batch {
            number,
            rows: rows.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tally_core::FieldValue;

    fn set_of(n: usize) -> TransactionSet {
        TransactionSet::from_rows(
            vec!["Name".into()],
            (0..n).map(|i| vec![FieldValue::text(format!("txn {i}"))]).collect(),
        )
    }

    #[test]
    fn test_partition_45_by_20() {
        let batches = partition(&set_of(45), 20);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(batches[1].range(), BatchRange { first: 20, last: 39 });
        assert_eq!(batches[2].range().to_string(), "40-44");
    }

    #[test]
    fn test_partition_covers_every_row_once() {
        for (n, size) in [(0, 3), (1, 1), (7, 3), (9, 3), (10, 20), (100, 7)] {
            let batches = partition(&set_of(n), size);
            let mut seen = HashSet::new();
            for (i, b) in batches.iter().enumerate() {
                assert!(b.len() <= size);
                if i + 1 < batches.len() {
                    assert_eq!(b.len(), size, "only the last batch may be short");
                }
                for idx in b.expected_indices() {
                    assert!(seen.insert(idx), "index {idx} in two batches");
                }
            }
            assert_eq!(seen.len(), n);
        }
    }

    #[test]
    fn test_zero_batch_size_means_one() {
        assert_eq!(partition(&set_of(3), 0).len(), 3);
    }
}
