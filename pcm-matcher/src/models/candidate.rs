//! Candidate label (abbreviation) records
//!
//! A candidate belongs to exactly one province. The same label string may be
//! validated in several provinces; each is a separate record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConfidenceTier;

/// Stored candidate label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLabel {
    pub id: i64,
    /// Short name (the controlled-vocabulary label)
    pub label: String,
    pub province: String,
    /// Registered full name, when the curation process knows it
    pub full_name: Option<String>,
    pub confidence_level: ConfidenceTier,
    /// Online-verification score (0-100)
    pub confidence_score: Option<f64>,
    /// Only validated labels are offered to the matcher
    pub validated: bool,
    pub needs_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting (or upserting) a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub label: String,
    pub province: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence_level: ConfidenceTier,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub needs_review: bool,
}

fn default_confidence() -> ConfidenceTier {
    ConfidenceTier::Low
}

impl NewCandidate {
    /// Validated candidate with default metadata
    pub fn validated(label: impl Into<String>, province: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            province: province.into(),
            full_name: None,
            confidence_level: ConfidenceTier::High,
            confidence_score: None,
            validated: true,
            needs_review: false,
        }
    }

    /// Unvalidated candidate awaiting curation
    pub fn pending(label: impl Into<String>, province: impl Into<String>) -> Self {
        Self {
            validated: false,
            confidence_level: ConfidenceTier::Low,
            ..Self::validated(label, province)
        }
    }
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub confidence_level: Option<ConfidenceTier>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub validated: Option<bool>,
    #[serde(default)]
    pub needs_review: Option<bool>,
}

impl CandidateUpdate {
    pub fn is_empty(&self) -> bool {
        self == &CandidateUpdate::default()
    }
}
