//! Targeting rules: operator parsing, validated conditions, and ordered rule sets.
//!
//! A rule is stored as `(signal, operator, value)` strings. It is compiled
//! into a [`RuleCondition`] once, at create/update time, so a malformed
//! operand (bad regex, non-numeric threshold, unknown operator) is rejected
//! there and never reaches the serving path.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DcoError, DcoResult};
use crate::signals::{SignalCatalog, SignalValue};

/// Comparison operator as stored on a rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Regex,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::In,
        Operator::Regex,
    ];

    /// Parse a stored operator name, accepting the legacy long-form aliases.
    pub fn parse(name: &str) -> DcoResult<Self> {
        let op = match name.trim() {
            "equals" | "eq" => Operator::Equals,
            "not_equals" | "ne" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "gt" | "greater_than" => Operator::Gt,
            "lt" | "less_than" => Operator::Lt,
            "gte" | "greater_equal" => Operator::Gte,
            "lte" | "less_equal" => Operator::Lte,
            "in" => Operator::In,
            "regex" => Operator::Regex,
            other => return Err(DcoError::InvalidRule(format!("unknown operator '{other}'"))),
        };
        Ok(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Regex => "regex",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled condition, one arm per operator.
#[derive(Debug, Clone)]
pub enum RuleCondition {
    Equals(String),
    NotEquals(String),
    Contains(String),
    NotContains(String),
    Gt(f64),
    Lt(f64),
    Gte(f64),
    Lte(f64),
    In(Vec<String>),
    Regex(Regex),
}

/// Result of testing one condition against one signal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    Satisfied,
    NotSatisfied,
    /// A numeric operator saw a value that is not a number.
    NonNumeric,
}

impl RuleCondition {
    /// Compile an operator and its raw operand.
    pub fn compile(operator: Operator, value: &str) -> DcoResult<Self> {
        let numeric = |value: &str| -> DcoResult<f64> {
            value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| {
                    DcoError::InvalidRule(format!(
                        "operator '{operator}' requires a numeric value, got '{value}'"
                    ))
                })
        };

        let condition = match operator {
            Operator::Equals => RuleCondition::Equals(value.to_string()),
            Operator::NotEquals => RuleCondition::NotEquals(value.to_string()),
            Operator::Contains => RuleCondition::Contains(value.to_string()),
            Operator::NotContains => RuleCondition::NotContains(value.to_string()),
            Operator::Gt => RuleCondition::Gt(numeric(value)?),
            Operator::Lt => RuleCondition::Lt(numeric(value)?),
            Operator::Gte => RuleCondition::Gte(numeric(value)?),
            Operator::Lte => RuleCondition::Lte(numeric(value)?),
            Operator::In => {
                let items: Vec<String> = value
                    .split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect();
                if items.is_empty() {
                    return Err(DcoError::InvalidRule(
                        "operator 'in' requires at least one list item".to_string(),
                    ));
                }
                RuleCondition::In(items)
            }
            Operator::Regex => RuleCondition::Regex(
                Regex::new(value)
                    .map_err(|e| DcoError::InvalidRule(format!("invalid regex '{value}': {e}")))?,
            ),
        };
        Ok(condition)
    }

    pub fn operator(&self) -> Operator {
        match self {
            RuleCondition::Equals(_) => Operator::Equals,
            RuleCondition::NotEquals(_) => Operator::NotEquals,
            RuleCondition::Contains(_) => Operator::Contains,
            RuleCondition::NotContains(_) => Operator::NotContains,
            RuleCondition::Gt(_) => Operator::Gt,
            RuleCondition::Lt(_) => Operator::Lt,
            RuleCondition::Gte(_) => Operator::Gte,
            RuleCondition::Lte(_) => Operator::Lte,
            RuleCondition::In(_) => Operator::In,
            RuleCondition::Regex(_) => Operator::Regex,
        }
    }

    /// Test a resolved signal value. Textual operators are case-sensitive.
    pub fn test(&self, actual: &SignalValue) -> ConditionOutcome {
        let holds = match self {
            RuleCondition::Equals(expected) => actual.as_text() == expected.as_str(),
            RuleCondition::NotEquals(expected) => actual.as_text() != expected.as_str(),
            RuleCondition::Contains(needle) => actual.as_text().contains(needle.as_str()),
            RuleCondition::NotContains(needle) => !actual.as_text().contains(needle.as_str()),
            RuleCondition::In(items) => {
                let text = actual.as_text();
                items.iter().any(|item| item.as_str() == text.as_ref())
            }
            RuleCondition::Regex(re) => re.is_match(&actual.as_text()),
            RuleCondition::Gt(threshold)
            | RuleCondition::Lt(threshold)
            | RuleCondition::Gte(threshold)
            | RuleCondition::Lte(threshold) => {
                let Some(n) = actual.as_number() else {
                    return ConditionOutcome::NonNumeric;
                };
                match self {
                    RuleCondition::Gt(_) => n > *threshold,
                    RuleCondition::Lt(_) => n < *threshold,
                    RuleCondition::Gte(_) => n >= *threshold,
                    _ => n <= *threshold,
                }
            }
        };
        if holds {
            ConditionOutcome::Satisfied
        } else {
            ConditionOutcome::NotSatisfied
        }
    }
}

/// Raw rule fields as submitted by the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub variant_id: Uuid,
    pub signal: String,
    pub operator: String,
    pub value: String,
    #[serde(default)]
    pub priority: i32,
}

/// A validated targeting rule.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub signal: String,
    pub operator: Operator,
    pub value: String,
    pub variant_id: Uuid,
    /// Lower is evaluated first.
    pub priority: i32,
    /// Monotonic creation order; breaks priority ties.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub condition: RuleCondition,
}

impl Rule {
    /// Validate a draft and compile its condition.
    ///
    /// Target-variant membership is checked by the caller, which owns the
    /// campaign's variant set.
    pub fn compile(
        id: Uuid,
        campaign_id: Uuid,
        sequence: u64,
        draft: RuleDraft,
        catalog: &SignalCatalog,
    ) -> DcoResult<Self> {
        let signal = draft.signal.trim().to_string();
        if signal.is_empty() {
            return Err(DcoError::InvalidRule("signal must not be empty".to_string()));
        }
        if !catalog.contains(&signal) {
            return Err(DcoError::InvalidRule(format!("unknown signal '{signal}'")));
        }
        let operator = Operator::parse(&draft.operator)?;
        let condition = RuleCondition::compile(operator, &draft.value)?;

        Ok(Self {
            id,
            campaign_id,
            signal,
            operator,
            value: draft.value,
            variant_id: draft.variant_id,
            priority: draft.priority,
            sequence,
            created_at: Utc::now(),
            condition,
        })
    }

    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            variant_id: self.variant_id,
            signal: self.signal.clone(),
            operator: self.operator.as_str().to_string(),
            value: self.value.clone(),
            priority: self.priority,
        }
    }
}

/// Rules of one campaign in evaluation order: ascending priority, then
/// creation sequence.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| (r.priority, r.sequence));
        Self { rules }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
