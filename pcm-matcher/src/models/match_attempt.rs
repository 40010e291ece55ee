//! Match attempt audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ConfidenceTier, MatchMethod, MatchOutcome};

/// Validation result as stored in the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "violations", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed,
    Failed(Vec<String>),
    /// Validation never ran (input rejected, resolver failed, empty proposal)
    NotRun,
}

impl ValidationOutcome {
    /// `validation_passed` column value
    pub fn passed(&self) -> Option<bool> {
        match self {
            ValidationOutcome::Passed => Some(true),
            ValidationOutcome::Failed(_) => Some(false),
            ValidationOutcome::NotRun => None,
        }
    }

    /// `validation_notes` column value
    pub fn notes(&self) -> Option<String> {
        match self {
            ValidationOutcome::Failed(violations) => Some(violations.join("; ")),
            _ => None,
        }
    }
}

/// One `match` call, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAttempt {
    pub province: String,
    pub full_name: String,
    /// Label the resolver or memo proposed, before validation
    pub proposed_label: Option<String>,
    /// Label actually returned to the caller
    pub matched_label: Option<String>,
    pub method: MatchMethod,
    pub confidence: ConfidenceTier,
    pub validation: ValidationOutcome,
    pub failure_code: Option<String>,
    pub rationale: Option<String>,
    pub resolver_model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl MatchAttempt {
    /// Audit record for a finished outcome
    pub fn from_outcome(
        outcome: &MatchOutcome,
        proposed_label: Option<String>,
        validation: ValidationOutcome,
    ) -> Self {
        Self {
            province: outcome.province.clone(),
            full_name: outcome.full_name.clone(),
            proposed_label,
            matched_label: outcome.label.clone(),
            method: outcome.method,
            confidence: outcome.confidence,
            validation,
            failure_code: outcome.failure.as_ref().map(|f| f.code().to_string()),
            rationale: outcome.rationale.clone(),
            resolver_model: None,
            prompt_tokens: None,
            completion_tokens: None,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate view of the audit log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub total_matches: usize,
    pub matched: usize,
    pub empty: usize,
    pub validation_passed: usize,
    pub by_method: BTreeMap<String, usize>,
    pub by_confidence: BTreeMap<String, usize>,
}
