//! Named prompt templates with `{{ placeholder }}` substitution.

use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tally_core::Transaction;

use crate::error::TemplateError;

pub const DEFAULT_PROMPT: &str = "categorise_expenses";

const PLACEHOLDERS: [&str; 5] = [
    "transactions",
    "categories",
    "personal_rules",
    "batch_size",
    "expected_indices",
];

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
});

const BUILTIN_SYSTEM: &str = "\
You are a careful bookkeeping assistant. You assign each bank transaction to \
exactly one spending category from a fixed list. You reply with JSON only: no \
prose, no code fences.";

const BUILTIN_USER: &str = "\
Categorise the following transactions.

Allowed categories: {{ categories }}

Personal rules to respect:
{{ personal_rules }}

Transactions (CSV, one per row, in order):
{{ transactions }}

Return a JSON array with exactly one object per transaction (at most \
{{ batch_size }} objects). Each object must have the keys \"Index\", \
\"Category\" and \"Confidence\" (a number between 0 and 1). Use these Index \
values, in this order: {{ expected_indices }}";

/// Values substituted into a template for one batch.
#[derive(Debug, Clone)]
pub struct PromptVars<'a> {
    /// Classification features of the batch, rendered as CSV
    pub transactions: String,
    pub categories: &'a [String],
    pub personal_rules: &'a [String],
    pub batch_size: usize,
    pub expected_indices: &'a [usize],
}

impl PromptVars<'_> {
    fn lookup(&self, name: &str) -> String {
        match name {
            "transactions" => self.transactions.trim_end().to_string(),
            "categories" => serde_json::to_string(self.categories).unwrap_or_default(),
            "personal_rules" => {
                if self.personal_rules.is_empty() {
                    "(none)".to_string()
                } else {
                    self.personal_rules
                        .iter()
                        .map(|r| format!("- {r}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            "batch_size" => self.batch_size.to_string(),
            "expected_indices" => serde_json::to_string(self.expected_indices).unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    /// Reject templates that reference a placeholder no batch can supply.
    pub fn check(&self, name: &str) -> Result<(), TemplateError> {
        for part in [&self.system, &self.user] {
            for caps in PLACEHOLDER.captures_iter(part) {
                let placeholder = &caps[1];
                if !PLACEHOLDERS.contains(&placeholder) {
                    return Err(TemplateError::UnknownPlaceholder {
                        template: name.to_string(),
                        name: placeholder.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Full prompt text: system part, blank line, user part.
    pub fn render(&self, vars: &PromptVars<'_>) -> String {
        let fill = |text: &str| {
            PLACEHOLDER
                .replace_all(text, |caps: &Captures| vars.lookup(&caps[1]))
                .into_owned()
        };
        format!("{}\n\n{}", fill(&self.system), fill(&self.user))
    }
}

/// Templates keyed by name. Always contains the built-in `categorise_expenses`.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            DEFAULT_PROMPT.to_string(),
            PromptTemplate {
                system: BUILTIN_SYSTEM.to_string(),
                user: BUILTIN_USER.to_string(),
            },
        );
        Self { templates }
    }
}

impl PromptLibrary {
    /// Built-ins plus every `[name]` table in a TOML file; file entries win.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::default().extend_from_toml(&text)
    }

    pub fn extend_from_toml(mut self, text: &str) -> Result<Self, TemplateError> {
        let parsed: HashMap<String, PromptTemplate> = toml::from_str(text)?;
        for (name, template) in parsed {
            template.check(&name)?;
            self.templates.insert(name, template);
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&PromptTemplate, TemplateError> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

/// Render the chosen feature columns of a batch as CSV, without the index.
pub fn render_transactions(rows: &[Transaction], features: &[String]) -> Result<String, TemplateError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(features)
        .map_err(|e| TemplateError::Render(e.to_string()))?;
    for txn in rows {
        wtr.write_record(features.iter().map(|f| txn.get(f).to_string()))
            .map_err(|e| TemplateError::Render(e.to_string()))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| TemplateError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| TemplateError::Render(e.to_string()))
}
