//! Declarative category rules.
//!
//! Rules are evaluated in list order against every transaction. A rule matches
//! when all of its conditions hold, and a later match overwrites an earlier one,
//! so the last matching rule in the list decides the category.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_core::{FieldValue, Transaction, TransactionSet};
use tracing::debug;

use crate::error::RuleError;
use crate::{CATEGORY, SUBCATEGORY};

/// One rule: assign `category`/`subcategory` when every condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A test on one field, e.g. `{ column = "Name", contains = ["tesco", "aldi"] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Case-insensitive literal substring match against any of the terms
    Contains(Vec<String>),
    Equals(FieldValue),
    Gt(FieldValue),
    Lt(FieldValue),
}

/// Category pair assigned to one transaction; `None` means unassigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

enum Matcher {
    Contains(Regex),
    Equals(FieldValue),
    Gt(FieldValue),
    Lt(FieldValue),
}

struct CompiledCondition {
    column: String,
    matcher: Matcher,
}

impl CompiledCondition {
    fn holds(&self, txn: &Transaction) -> bool {
        let value = txn.get(&self.column);
        match &self.matcher {
            Matcher::Contains(re) => value
                .as_text()
                .is_some_and(|text| re.is_match(&text.to_lowercase())),
            Matcher::Equals(expected) => value.equals(expected),
            Matcher::Gt(bound) => value.compare(bound).is_some_and(|o| o.is_gt()),
            Matcher::Lt(bound) => value.compare(bound).is_some_and(|o| o.is_lt()),
        }
    }
}

struct CompiledRule {
    rule: Rule,
    conditions: Vec<CompiledCondition>,
}

impl CompiledRule {
    fn matches(&self, txn: &Transaction) -> bool {
        self.conditions.iter().all(|c| c.holds(txn))
    }
}

/// An ordered, compiled list of rules. Immutable once built.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

/// Per-rule match counts from one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSummary {
    /// (rule label, rows matched) in rule order
    pub per_rule: Vec<(String, usize)>,
    pub categorised: usize,
    pub unassigned: usize,
}

impl RuleSet {
    /// Compile contains-terms into one escaped, case-insensitive alternation per condition.
    pub fn compile(rules: Vec<Rule>) -> Result<Self, RuleError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (i, rule) in rules.into_iter().enumerate() {
            let mut conditions = Vec::with_capacity(rule.conditions.len());
            for cond in &rule.conditions {
                let matcher = match &cond.predicate {
                    Predicate::Contains(terms) => {
                        let pattern = terms
                            .iter()
                            .map(|t| regex::escape(&t.to_lowercase()))
                            .collect::<Vec<_>>()
                            .join("|");
                        let re = RegexBuilder::new(&pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|source| RuleError::Pattern {
                                rule: i,
                                category: rule.category.clone(),
                                source,
                            })?;
                        Matcher::Contains(re)
                    }
                    Predicate::Equals(v) => Matcher::Equals(v.clone()),
                    Predicate::Gt(v) => Matcher::Gt(v.clone()),
                    Predicate::Lt(v) => Matcher::Lt(v.clone()),
                };
                conditions.push(CompiledCondition {
                    column: cond.column.clone(),
                    matcher,
                });
            }
            compiled.push(CompiledRule { rule, conditions });
        }
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|r| &r.rule)
    }

    fn evaluate(&self, set: &TransactionSet) -> (Vec<Assignment>, Vec<usize>) {
        let mut out = vec![Assignment::default(); set.len()];
        let mut hits = vec![0usize; self.rules.len()];

        for (r, rule) in self.rules.iter().enumerate() {
            for (slot, txn) in out.iter_mut().zip(set.rows()) {
                if rule.matches(txn) {
                    slot.category = Some(rule.rule.category.clone());
                    // A rule without a subcategory keeps the one already assigned
                    if let Some(sub) = &rule.rule.subcategory {
                        slot.subcategory = Some(sub.clone());
                    }
                    hits[r] += 1;
                }
            }
        }
        (out, hits)
    }
}

/// Evaluate every rule in order; one assignment per transaction, in row order.
pub fn apply_rules(set: &TransactionSet, rules: &RuleSet) -> Vec<Assignment> {
    rules.evaluate(set).0
}

/// Overwrite the `Category` and `Subcategory` columns from the rules.
/// Unmatched rows are set to null so they surface for manual review.
pub fn assign_rules(set: &mut TransactionSet, rules: &RuleSet) -> RuleSummary {
    let (assignments, hits) = rules.evaluate(set);

    set.add_column(CATEGORY);
    set.add_column(SUBCATEGORY);
    let mut categorised = 0;
    for (pos, a) in assignments.into_iter().enumerate() {
        if a.category.is_some() {
            categorised += 1;
        }
        set.assign(pos, CATEGORY, a.category.map(FieldValue::Text).unwrap_or_default());
        set.assign(pos, SUBCATEGORY, a.subcategory.map(FieldValue::Text).unwrap_or_default());
    }

    let per_rule = rules
        .rules()
        .zip(hits)
        .map(|(rule, n)| (label(rule), n))
        .collect();
    let unassigned = set.len() - categorised;
    debug!(categorised, unassigned, "rules applied");

    RuleSummary {
        per_rule,
        categorised,
        unassigned,
    }
}

fn label(rule: &Rule) -> String {
    match &rule.subcategory {
        Some(sub) => format!("{} / {}", rule.category, sub),
        None => rule.category.clone(),
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Load rules from `.json` (a top-level array) or TOML (`[[rules]]` tables).
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<Rule>, RuleError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(toml::from_str::<RuleFile>(&text)?.rules)
    }
}
