use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_categorise::{CategoriseConfig, CategoryContext, DEFAULT_PROMPT};

use crate::state::{ensure_tally_home, tally_home};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelSection,
    pub categorise: CategoriseSection,
    pub data: DataSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// "ollama" or "openai" (any OpenAI-compatible chat completions endpoint)
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Environment variable holding the API key, if the endpoint needs one
    pub api_key_env: Option<String>,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoriseSection {
    pub max_retries: u32,
    pub delay_secs: f64,
    pub batch_size: usize,
    pub max_workers: usize,
    pub return_columns: Vec<String>,
    pub prompt_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub classification_features: Vec<String>,
    pub categories: Vec<String>,
    pub personal_rules: Vec<String>,
    pub rules_path: Option<PathBuf>,
    pub prompts_path: Option<PathBuf>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "mistral:7b-instruct-q4_0".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 180,
            api_key_env: None,
            temperature: 0.0,
        }
    }
}

impl Default for CategoriseSection {
    fn default() -> Self {
        let defaults = CategoriseConfig::default();
        Self {
            max_retries: defaults.max_retries,
            delay_secs: defaults.delay.as_secs_f64(),
            batch_size: defaults.batch_size,
            max_workers: defaults.max_workers,
            return_columns: defaults.return_columns,
            prompt_name: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            classification_features: vec!["Name".to_string(), "Amount".to_string()],
            categories: [
                "Bills",
                "Eating Out",
                "Entertainment",
                "Groceries",
                "Health",
                "Holidays",
                "Income",
                "Shopping",
                "Transfers",
                "Transport",
            ]
            .map(String::from)
            .to_vec(),
            personal_rules: Vec::new(),
            rules_path: None,
            prompts_path: None,
        }
    }
}

impl CategoriseSection {
    pub fn to_config(&self) -> Result<CategoriseConfig> {
        let delay = Duration::try_from_secs_f64(self.delay_secs)
            .with_context(|| format!("invalid delay_secs: {}", self.delay_secs))?;
        Ok(CategoriseConfig {
            max_retries: self.max_retries,
            delay,
            batch_size: self.batch_size,
            max_workers: self.max_workers,
            return_columns: self.return_columns.clone(),
            prompt_name: self.prompt_name.clone(),
        })
    }
}

impl DataSection {
    pub fn context(&self) -> CategoryContext {
        CategoryContext {
            categories: self.categories.clone(),
            personal_rules: self.personal_rules.clone(),
            classification_features: self.classification_features.clone(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(tally_home()?.join("config.toml"))
}

/// Read an explicit config file, or `~/.tally/config.toml` when none is given.
/// Only the default location may be absent.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let p = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = config_path()?;
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    Ok(toml::from_str(s)?)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = ensure_tally_home()?.join("config.toml");
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library() {
        let cfg = Config::default();
        assert_eq!(cfg.categorise.to_config().unwrap(), CategoriseConfig::default());
        assert_eq!(cfg.model.provider, "ollama");
        assert_eq!(cfg.model.timeout_secs, 180);
        assert_eq!(cfg.data.context().classification_features, vec!["Name", "Amount"]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = parse_config(
            r#"
            [model]
            provider = "openai"
            model = "gpt-4o-mini"
            base_url = "https://api.openai.com"
            api_key_env = "OPENAI_API_KEY"

            [categorise]
            batch_size = 10
            delay_secs = 0.5

            [data]
            categories = ["Food", "Rent"]
            rules_path = "rules.toml"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.model.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(cfg.model.timeout_secs, 180);
        let run = cfg.categorise.to_config().unwrap();
        assert_eq!(run.batch_size, 10);
        assert_eq!(run.delay, Duration::from_millis(500));
        assert_eq!(run.max_retries, 3);
        assert_eq!(cfg.data.categories, vec!["Food", "Rent"]);
        assert_eq!(cfg.data.rules_path, Some(PathBuf::from("rules.toml")));
        assert_eq!(cfg.data.classification_features, vec!["Name", "Amount"]);
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert_eq!(parse_config(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let cfg = parse_config("[categorise]\ndelay_secs = -1.0\n").unwrap();
        assert!(cfg.categorise.to_config().is_err());
    }
}
