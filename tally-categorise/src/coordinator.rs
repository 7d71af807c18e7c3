//! Batch fan-out: prompt, call, parse, validate and retry, then merge.
//!
//! Each batch runs end to end on a blocking worker thread. At most
//! `max_workers` batches are in flight; results come back through the join
//! set in completion order and are merged by index, so output order is the
//! input order. The first fatal batch failure ends the run: queued batches are
//! never started and results still in flight are dropped.

use std::sync::Arc;
use tally_core::TransactionSet;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::batch::{partition, Batch, BatchRange};
use crate::config::{CategoriseConfig, CategoryContext};
use crate::error::{AttemptFailure, BatchExhaustedError, CategoriseError};
use crate::merge::merge_records;
use crate::model::CompletionModel;
use crate::parser::extract_structured_records;
use crate::prompt::{render_transactions, PromptLibrary, PromptTemplate, PromptVars};
use crate::retry::{AttemptState, RetryMachine, RetryPolicy};
use crate::validate::{validate_records, ClassificationRecord};

/// Fatal outcome of one batch task.
#[derive(Debug)]
enum BatchFailure {
    Exhausted(BatchExhaustedError),
    Model { range: BatchRange, source: anyhow::Error },
    Template(crate::error::TemplateError),
}

impl From<BatchFailure> for CategoriseError {
    fn from(f: BatchFailure) -> Self {
        match f {
            BatchFailure::Exhausted(e) => CategoriseError::Exhausted(e),
            BatchFailure::Model { range, source } => CategoriseError::Model { range, source },
            BatchFailure::Template(e) => CategoriseError::Template(e),
        }
    }
}

/// Everything one worker needs to process a batch without touching shared state.
struct BatchJob {
    batch: Batch,
    model: Arc<dyn CompletionModel>,
    template: Arc<PromptTemplate>,
    context: Arc<CategoryContext>,
    return_columns: Arc<[String]>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl BatchJob {
    fn run(self) -> Result<Vec<ClassificationRecord>, BatchFailure> {
        let range = self.batch.range();
        let expected_indices = self.batch.expected_indices();
        let transactions = render_transactions(&self.batch.rows, &self.context.classification_features)
            .map_err(BatchFailure::Template)?;
        let prompt = self.template.render(&PromptVars {
            transactions,
            categories: &self.context.categories,
            personal_rules: &self.context.personal_rules,
            batch_size: self.batch_size,
            expected_indices: &expected_indices,
        });

        let mut machine = RetryMachine::new(self.policy);

        loop {
            let attempt = machine.begin();
            info!(batch = %range, number = self.batch.number, attempt, "requesting categories");
            let reply = self
                .model
                .complete(&prompt)
                .map_err(|source| BatchFailure::Model { range, source })?;

            match self.check(&reply) {
                Ok(records) => {
                    machine.succeed();
                    debug!(batch = %range, attempt, records = records.len(), "batch categorised");
                    return Ok(records);
                }
                Err(failure) => {
                    warn!(batch = %range, attempt, "rejected reply: {failure}");
                    debug!(batch = %range, raw = %reply, "rejected reply text");
                    if let AttemptState::Exhausted(attempts) = machine.fail() {
                        error!(batch = %range, attempts, "giving up on batch");
                        return Err(BatchFailure::Exhausted(BatchExhaustedError {
                            range,
                            attempts,
                            last_failure: failure,
                            last_reply: reply,
                        }));
                    }
                    std::thread::sleep(machine.delay());
                }
            }
        }
    }

    fn check(&self, reply: &str) -> Result<Vec<ClassificationRecord>, AttemptFailure> {
        let parsed = extract_structured_records(reply)?;
        Ok(validate_records(parsed, &self.batch, &self.return_columns)?)
    }
}

/// Model-backed categoriser for whole transaction sets.
pub struct Categoriser {
    model: Arc<dyn CompletionModel>,
    template: Arc<PromptTemplate>,
    context: Arc<CategoryContext>,
    config: CategoriseConfig,
}

impl Categoriser {
    /// Use the built-in prompt library.
    pub fn new(
        model: Arc<dyn CompletionModel>,
        context: CategoryContext,
        config: CategoriseConfig,
    ) -> Result<Self, CategoriseError> {
        Self::with_prompts(model, context, config, &PromptLibrary::default())
    }

    pub fn with_prompts(
        model: Arc<dyn CompletionModel>,
        context: CategoryContext,
        config: CategoriseConfig,
        prompts: &PromptLibrary,
    ) -> Result<Self, CategoriseError> {
        config.validate()?;
        let template = prompts.get(&config.prompt_name)?.clone();
        template.check(&config.prompt_name)?;
        Ok(Self {
            model,
            template: Arc::new(template),
            context: Arc::new(context),
            config,
        })
    }

    pub fn config(&self) -> &CategoriseConfig {
        &self.config
    }

    /// Categorise every transaction, or fail without producing any output.
    pub async fn categorise(&self, transactions: TransactionSet) -> Result<TransactionSet, CategoriseError> {
        for feature in &self.context.classification_features {
            if !transactions.has_column(feature) {
                return Err(CategoriseError::MissingFeature(feature.clone()));
            }
        }

        let batches = partition(&transactions, self.config.batch_size);
        info!(
            rows = transactions.len(),
            batches = batches.len(),
            workers = self.config.max_workers,
            "categorising with model"
        );

        let return_columns: Arc<[String]> = self.config.return_columns.clone().into();
        let policy = RetryPolicy::new(self.config.max_retries, self.config.delay);
        let mut queue = batches.into_iter();
        let mut tasks = JoinSet::new();
        let mut records = Vec::with_capacity(transactions.len());

        loop {
            while tasks.len() < self.config.max_workers {
                let Some(batch) = queue.next() else { break };
                let job = BatchJob {
                    batch,
                    model: Arc::clone(&self.model),
                    template: Arc::clone(&self.template),
                    context: Arc::clone(&self.context),
                    return_columns: Arc::clone(&return_columns),
                    policy,
                    batch_size: self.config.batch_size,
                };
                tasks.spawn_blocking(move || job.run());
            }

            let Some(joined) = tasks.join_next().await else { break };
            match joined? {
                Ok(batch_records) => records.extend(batch_records),
                Err(failure) => {
                    tasks.abort_all();
                    return Err(failure.into());
                }
            }
        }

        Ok(merge_records(transactions, records, &self.config.return_columns))
    }
}

/// One-shot form of [`Categoriser::categorise`] with the built-in prompts.
pub async fn categorise(
    transactions: TransactionSet,
    context: CategoryContext,
    model: Arc<dyn CompletionModel>,
    config: CategoriseConfig,
) -> Result<TransactionSet, CategoriseError> {
    Categoriser::new(model, context, config)?
        .categorise(transactions)
        .await
}
