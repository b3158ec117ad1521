//! Resolved request signals and the catalog of targetable signal names.
//!
//! The resolver that turns a raw request (IP, headers, clock) into geo,
//! weather, and daypart values lives outside this crate; the decision core
//! only ever sees the resolved [`SignalContext`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Signals the resolver knows how to produce.
pub const BUILTIN_SIGNALS: &[&str] = &[
    "geo_country",
    "geo_city",
    "geo_region",
    "weather_condition",
    "weather_temp",
    "weather_is_hot",
    "weather_is_cold",
    "daypart",
    "daypart_hour",
    "daypart_is_morning",
    "daypart_is_afternoon",
    "daypart_is_evening",
    "daypart_is_night",
    "daypart_is_weekend",
    "user_agent",
    "referer",
];

/// A single resolved signal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SignalValue {
    /// Canonical string form used by the textual operators.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            SignalValue::Text(s) => Cow::Borrowed(s.as_str()),
            SignalValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            SignalValue::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    /// Numeric view; booleans and unparseable text have none.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SignalValue::Number(n) => Some(*n),
            SignalValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            SignalValue::Bool(_) => None,
        }
    }

    /// Parse a raw override string: booleans, then numbers, else text.
    pub fn parse_override(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            return SignalValue::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return SignalValue::Bool(false);
        }
        let parsed = if raw.contains('.') {
            raw.parse::<f64>().ok()
        } else {
            raw.parse::<i64>().ok().map(|n| n as f64)
        };
        match parsed {
            Some(n) if n.is_finite() => SignalValue::Number(n),
            _ => SignalValue::Text(raw.to_string()),
        }
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::Text(value)
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Number(value)
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        SignalValue::Bool(value)
    }
}

/// Per-request mapping from signal name to resolved value. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalContext {
    values: BTreeMap<String, SignalValue>,
}

impl SignalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signal: &str) -> Option<&SignalValue> {
        self.values.get(signal)
    }

    pub fn insert(&mut self, signal: impl Into<String>, value: impl Into<SignalValue>) {
        self.values.insert(signal.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, signal: impl Into<String>, value: impl Into<SignalValue>) -> Self {
        self.insert(signal, value);
        self
    }

    /// Overlay `overrides` on top of this context; overrides win.
    pub fn merge(&mut self, overrides: SignalContext) {
        self.values.extend(overrides.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SignalValue)> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<SignalValue>> FromIterator<(K, V)> for SignalContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Set of signal names a rule may target.
#[derive(Debug, Clone)]
pub struct SignalCatalog {
    names: HashSet<String>,
}

impl SignalCatalog {
    /// Built-in signals plus deployment-specific extras.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: HashSet<String> = BUILTIN_SIGNALS.iter().map(|s| s.to_string()).collect();
        names.extend(extra.into_iter().map(Into::into));
        Self { names }
    }

    pub fn contains(&self, signal: &str) -> bool {
        self.names.contains(signal)
    }
}

impl Default for SignalCatalog {
    fn default() -> Self {
        Self::with_extra(std::iter::empty::<String>())
    }
}
