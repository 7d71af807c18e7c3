//! tally-categorise: rule engine and model-backed batch categorisation

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod rules;
pub mod validate;

pub use batch::{partition, Batch, BatchRange};
pub use config::{CategoriseConfig, CategoryContext};
pub use coordinator::{categorise, Categoriser};
pub use error::{
    AttemptFailure, BatchExhaustedError, CategoriseError, ConfigError, ParseError, RuleError,
    TemplateError, ValidationError,
};
pub use merge::merge_records;
pub use model::CompletionModel;
pub use parser::extract_structured_records;
pub use prompt::{PromptLibrary, PromptTemplate, DEFAULT_PROMPT};
pub use retry::{AttemptState, RetryMachine, RetryPolicy};
pub use rules::{apply_rules, assign_rules, load_rules, Assignment, Condition, Predicate, Rule, RuleSet, RuleSummary};
pub use validate::{normalise_field_name, validate_records, ClassificationRecord};

/// Output column written by both classifiers.
pub const CATEGORY: &str = "Category";
pub const SUBCATEGORY: &str = "Subcategory";
pub const CONFIDENCE: &str = "Confidence";
/// Join key between batches and the original set; never an output column.
pub const INDEX: &str = "Index";
