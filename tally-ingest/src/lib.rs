//! tally-ingest: load and save transaction tables as CSV.

pub mod csv_table;

pub use csv_table::{read_transactions_csv, read_transactions_from, write_transactions_csv, write_transactions_to};
