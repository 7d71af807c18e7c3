//! tally-core: transaction table types shared by ingestion and categorisation

pub mod transaction;
pub mod value;

pub use transaction::{Transaction, TransactionSet};
pub use value::FieldValue;
