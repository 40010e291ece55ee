//! Per-item match outcomes
//!
//! Every item handed to the matcher resolves to exactly one [`MatchOutcome`].
//! Failures never abort a batch; they are carried as a [`MatchFailure`] next
//! to an empty label.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Coarse confidence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "High",
            ConfidenceTier::Medium => "Medium",
            ConfidenceTier::Low => "Low",
        }
    }

    /// Lenient parse used for untrusted resolver output; unknown values are Low
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(ConfidenceTier::Low)
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(ConfidenceTier::High),
            "medium" => Ok(ConfidenceTier::Medium),
            "low" => Ok(ConfidenceTier::Low),
            other => Err(format!("Unknown confidence tier: {}", other)),
        }
    }
}

/// How a label was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchMethod {
    /// Confirmed mapping from past feedback; resolver not invoked
    #[serde(rename = "memo")]
    Memo,
    /// External resolver proposal that went through validation
    #[serde(rename = "llm")]
    Resolver,
    /// Rejected before any lookup (bad input, empty vocabulary, missing fields)
    #[serde(rename = "none")]
    Skipped,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Memo => "memo",
            MatchMethod::Resolver => "llm",
            MatchMethod::Skipped => "none",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memo" => Ok(MatchMethod::Memo),
            "llm" => Ok(MatchMethod::Resolver),
            "none" => Ok(MatchMethod::Skipped),
            other => Err(format!("Unknown match method: {}", other)),
        }
    }
}

/// Per-item failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum MatchFailure {
    /// Malformed full name or province; rejected before any external call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Province has no validated candidates; not escalated to the resolver
    #[error("No candidates for province")]
    NoCandidatesForProvince,

    /// Transport error, timeout or malformed resolver response
    #[error("Resolver failure: {0}")]
    ResolverFailure(String),

    /// Proposal rejected by closed-world validation
    #[error("Validation violation: {}", .0.join("; "))]
    ValidationViolation(Vec<String>),

    /// Batch item without full name or province
    #[error("Missing required fields")]
    MissingFields,
}

impl MatchFailure {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            MatchFailure::InvalidInput(_) => "invalid_input",
            MatchFailure::NoCandidatesForProvince => "no_candidates_for_province",
            MatchFailure::ResolverFailure(_) => "resolver_failure",
            MatchFailure::ValidationViolation(_) => "validation_violation",
            MatchFailure::MissingFields => "missing_fields",
        }
    }
}

/// Decision for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub full_name: String,
    pub province: String,
    /// Matched label; always a member of the province vocabulary when present
    pub label: Option<String>,
    pub confidence: ConfidenceTier,
    pub method: MatchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<MatchFailure>,
    /// Advisory validation warnings (e.g. label also validated elsewhere)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MatchOutcome {
    /// Outcome with an empty label and Low confidence
    pub fn failed(
        full_name: impl Into<String>,
        province: impl Into<String>,
        method: MatchMethod,
        failure: MatchFailure,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            province: province.into(),
            label: None,
            confidence: ConfidenceTier::Low,
            method,
            rationale: None,
            failure: Some(failure),
            warnings: Vec::new(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.label.is_some()
    }

    /// "matched", "no_match" or the failure code
    pub fn status(&self) -> &'static str {
        match (&self.failure, &self.label) {
            (Some(failure), _) => failure.code(),
            (None, Some(_)) => "matched",
            (None, None) => "no_match",
        }
    }

    /// Human-readable validation status for exported rows
    pub fn validation_status(&self) -> String {
        match &self.failure {
            None if self.label.is_none() => "not_run".to_string(),
            None => "passed".to_string(),
            Some(MatchFailure::ValidationViolation(violations)) => {
                format!("failed: {}", violations.join("; "))
            }
            Some(other) => other.code().to_string(),
        }
    }
}

/// Incoming batch row; either field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
}

impl BatchItem {
    pub fn new(full_name: impl Into<String>, province: impl Into<String>) -> Self {
        Self {
            full_name: Some(full_name.into()),
            province: Some(province.into()),
        }
    }

    /// Both fields, if present and non-blank
    pub fn fields(&self) -> Option<(&str, &str)> {
        let full_name = self.full_name.as_deref().filter(|s| !s.trim().is_empty())?;
        let province = self.province.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((full_name, province))
    }
}

/// Exported result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub full_name: String,
    pub province: String,
    pub matched_label: Option<String>,
    pub confidence_tier: ConfidenceTier,
    pub match_method: MatchMethod,
    pub validation_status: String,
}

impl From<&MatchOutcome> for MatchRow {
    fn from(outcome: &MatchOutcome) -> Self {
        Self {
            full_name: outcome.full_name.clone(),
            province: outcome.province.clone(),
            matched_label: outcome.label.clone(),
            confidence_tier: outcome.confidence,
            match_method: outcome.method,
            validation_status: outcome.validation_status(),
        }
    }
}

/// Aggregate counts over one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub matched: usize,
    pub empty: usize,
    pub validation_passed: usize,
    pub by_method: BTreeMap<String, usize>,
    pub by_failure: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[MatchOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            if outcome.is_matched() {
                summary.matched += 1;
            } else {
                summary.empty += 1;
            }
            if outcome.is_matched() && outcome.failure.is_none() {
                summary.validation_passed += 1;
            }
            *summary
                .by_method
                .entry(outcome.method.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(failure) = &outcome.failure {
                *summary
                    .by_failure
                    .entry(failure.code().to_string())
                    .or_insert(0) += 1;
            }
        }

        summary
    }
}
