// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Free & Fair
// See LICENSE.md for details

//! Tunable audit parameters as ordered (label, value) pairs.
//!
//! External configuration sources historically supplied either raw numbers or
//! percentage-suffixed strings; both encodings are accepted on input.
//! Percentages always render with two decimal places on output.

use crate::error::AuditError;

/// One named parameter as reported by an audit engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub label: &'static str,
    pub value: String,
}

impl Parameter {
    pub fn new(label: &'static str, value: String) -> Self {
        Self { label, value }
    }
}

/// One parameter value as supplied by the caller: a raw number or a string
/// with an optional `%` suffix.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

impl ParameterValue {
    /// Interpret the value with percentage semantics: `5`, `"5"`, `"5%"` and
    /// `"5.00%"` all yield `0.05`.
    pub fn as_rate(&self, label: &'static str) -> Result<f64, AuditError> {
        Ok(self.parse(label)? / 100.0)
    }

    /// Interpret the value as a plain number.
    pub fn as_number(&self, label: &'static str) -> Result<f64, AuditError> {
        self.parse(label)
    }

    fn parse(&self, label: &'static str) -> Result<f64, AuditError> {
        match self {
            ParameterValue::Number(n) => Ok(*n),
            ParameterValue::Text(text) => {
                let trimmed = text.trim();
                let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
                trimmed
                    .parse::<f64>()
                    .map_err(|e| AuditError::Parameter {
                        label: label.to_string(),
                        reason: format!("cannot parse {text:?}: {e}"),
                    })
            }
        }
    }
}

/// Fetch the `index`-th value from a `set_parameters` call, failing when the
/// caller supplied too few values.
pub(crate) fn required<'a>(
    values: &'a [ParameterValue],
    index: usize,
    label: &'static str,
) -> Result<&'a ParameterValue, AuditError> {
    values.get(index).ok_or_else(|| AuditError::Parameter {
        label: label.to_string(),
        reason: format!("missing value at position {index}"),
    })
}

/// Render a fraction as a percentage with two decimal places: `0.01` becomes
/// `"1.00%"`.
pub(crate) fn format_percentage(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}
