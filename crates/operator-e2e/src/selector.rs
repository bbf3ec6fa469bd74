//! Label selectors used to address pods, services, nodes and jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::E2eError;

/// A single constraint on a label value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// `key=value`
    Equals(String),
    /// `key!=value`; also matches objects without the label.
    NotEquals(String),
}

/// A set of label constraints, at most one per key.
///
/// Constraints are kept sorted by key so the rendered selector string is the
/// same regardless of the order they were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LabelSelector {
    constraints: BTreeMap<String, Constraint>,
}

impl LabelSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a `key=value` constraint.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints
            .insert(key.into(), Constraint::Equals(value.into()));
        self
    }

    /// Add (or replace) a `key!=value` constraint.
    #[must_use]
    pub fn without(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints
            .insert(key.into(), Constraint::NotEquals(value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Evaluate the selector against a label map.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.constraints
            .iter()
            .all(|(key, constraint)| match constraint {
                Constraint::Equals(value) => labels.get(key) == Some(value),
                Constraint::NotEquals(value) => labels.get(key) != Some(value),
            })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, constraint) in &self.constraints {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match constraint {
                Constraint::Equals(value) => write!(f, "{key}={value}")?,
                Constraint::NotEquals(value) => write!(f, "{key}!={value}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for LabelSelector {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = Self::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            selector = if let Some((key, value)) = term.split_once("!=") {
                selector.without(key.trim(), value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                // tolerate the `==` spelling
                selector.with(key.trim(), value.trim().trim_start_matches('='))
            } else {
                return Err(E2eError::Config(format!(
                    "Invalid label selector term '{term}' in '{s}'"
                )));
            };
        }
        Ok(selector)
    }
}

impl TryFrom<String> for LabelSelector {
    type Error = E2eError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LabelSelector> for String {
    fn from(selector: LabelSelector) -> Self {
        selector.to_string()
    }
}
