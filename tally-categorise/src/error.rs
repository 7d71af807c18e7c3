use thiserror::Error;

use crate::batch::BatchRange;

/// The reply contained no recognisable list of records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

/// The reply parsed, but does not describe the batch it was asked about.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "batch {range}: expected {expected} records, got {returned}\n\
         expected indices: {expected_indices:?}\n\
         returned: {returned_items}"
    )]
    CountMismatch {
        range: BatchRange,
        expected: usize,
        returned: usize,
        expected_indices: Vec<usize>,
        returned_items: String,
    },

    #[error("record {position} is not an object")]
    NotAnObject { position: usize },

    #[error("record {position} is missing both 'Index' and 'index'")]
    MissingIndex { position: usize },

    #[error("record {position} has an index that is not a row number: {value}")]
    InvalidIndex { position: usize, value: String },

    #[error(
        "batch {range}: indices do not match the batch\n\
         expected indices: {expected_indices:?}\n\
         returned indices: {returned_indices:?}"
    )]
    IndexMismatch {
        range: BatchRange,
        expected_indices: Vec<usize>,
        returned_indices: Vec<usize>,
    },

    #[error("record {position} is missing '{column}'")]
    MissingColumn { position: usize, column: String },
}

/// Why a single attempt at a batch was rejected. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("unparseable reply: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid reply: {0}")]
    Validation(#[from] ValidationError),
}

/// Every attempt for one batch was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch {range} failed after {attempts} attempts: {last_failure}\nlast reply: {last_reply}")]
pub struct BatchExhaustedError {
    pub range: BatchRange,
    pub attempts: u32,
    pub last_failure: AttemptFailure,
    pub last_reply: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),

    #[error("return_columns must name at least one column")]
    NoReturnColumns,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("prompt '{0}' not found")]
    NotFound(String),

    #[error("prompt '{template}' uses unknown placeholder '{name}'")]
    UnknownPlaceholder { template: String, name: String },

    #[error("read prompts {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse prompts: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("render transactions: {0}")]
    Render(String),
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("read rules {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse TOML rules: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("parse JSON rules: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule {rule} ({category}): {source}")]
    Pattern {
        rule: usize,
        category: String,
        #[source]
        source: regex::Error,
    },
}

/// A categorisation run failed; no partial result is produced.
#[derive(Debug, Error)]
pub enum CategoriseError {
    #[error(transparent)]
    Exhausted(#[from] BatchExhaustedError),

    #[error("model service failed on batch {range}: {source:#}")]
    Model {
        range: BatchRange,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("classification feature '{0}' is not a column of the dataset")]
    MissingFeature(String),

    #[error("batch worker stopped: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
