use std::time::Duration;

use crate::error::ConfigError;
use crate::prompt::DEFAULT_PROMPT;
use crate::{CATEGORY, CONFIDENCE};

/// Knobs for a model-backed categorisation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoriseConfig {
    /// Attempts per batch before it is declared exhausted
    pub max_retries: u32,
    /// Fixed pause between attempts of the same batch
    pub delay: Duration,
    pub batch_size: usize,
    /// Batches processed at the same time
    pub max_workers: usize,
    /// Fields every returned record must carry (matched case-insensitively)
    pub return_columns: Vec<String>,
    pub prompt_name: String,
}

impl Default for CategoriseConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
            batch_size: 20,
            max_workers: 4,
            return_columns: vec![CATEGORY.to_string(), CONFIDENCE.to_string()],
            prompt_name: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl CategoriseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Zero("max_retries"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Zero("max_workers"));
        }
        if self.return_columns.is_empty() {
            return Err(ConfigError::NoReturnColumns);
        }
        Ok(())
    }
}

/// What the model is told about the user's books.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryContext {
    /// Allowed category names
    pub categories: Vec<String>,
    /// Free-text hints, one per line in the prompt
    pub personal_rules: Vec<String>,
    /// Columns shown to the model for each transaction
    pub classification_features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CategoriseConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.delay, Duration::from_secs(2));
        assert_eq!(cfg.batch_size, 20);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.return_columns, vec!["Category", "Confidence"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let cfg = CategoriseConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Zero("max_workers"))));

        let cfg = CategoriseConfig {
            return_columns: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NoReturnColumns)));
    }
}
