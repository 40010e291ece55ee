//! Closed-world validation of proposed labels
//!
//! Three layers, applied in order to any non-empty proposal:
//!
//! 1. **Membership**: the label must be in the target province's set.
//! 2. **Cross-province**: a label found only under another cached province
//!    is a violation; a label that is also in the target set only warns.
//! 3. **Fabrication**: a label absent from every cached set is a violation.
//!
//! Counters accumulate across calls until [`MatchValidator::reset_stats`].

use pcm_common::config::ValidationConfig;
use pcm_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::candidate_library::{CandidateLibrary, LabelSet};
use crate::models::feedback::percentage;

/// A reason a proposal was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    NotInDatabase { label: String, province: String },
    CrossProvince { label: String, province: String, other: String },
    Fabricated { label: String },
    MissingProvince,
}

impl Violation {
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::NotInDatabase { .. } => "not_in_database",
            Violation::CrossProvince { .. } => "cross_province",
            Violation::Fabricated { .. } => "fabricated",
            Violation::MissingProvince => "missing_province",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotInDatabase { label, province } => {
                write!(f, "label '{}' is not a candidate of province '{}'", label, province)
            }
            Violation::CrossProvince { label, province, other } => {
                write!(f, "label '{}' belongs to province '{}', not '{}'", label, other, province)
            }
            Violation::Fabricated { label } => {
                write!(f, "label '{}' is not in any province's vocabulary (fabricated)", label)
            }
            Violation::MissingProvince => f.write_str("province is missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Present only when passed
    pub label: Option<String>,
    pub province: String,
    pub violations: Vec<Violation>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn empty(province: &str) -> Self {
        Self {
            passed: true,
            label: None,
            province: province.to_string(),
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Passed with zero violations (stricter than `passed` in lenient mode)
    pub fn is_valid(&self) -> bool {
        self.passed && self.violations.is_empty()
    }

    pub fn violation_messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Cumulative counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub by_type: BTreeMap<String, u64>,
}

/// Per-call statistics of [`MatchValidator::batch_validate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchValidationStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub violation_types: BTreeMap<String, usize>,
}

/// Row for batch validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationItem {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
}

pub struct MatchValidator {
    library: Arc<CandidateLibrary>,
    config: ValidationConfig,
    stats: Mutex<ValidationStats>,
}

impl MatchValidator {
    pub fn new(library: Arc<CandidateLibrary>, config: ValidationConfig) -> Self {
        tracing::info!(
            strict_mode = config.strict_mode,
            allow_cross_province = config.allow_cross_province,
            allow_fabricated = config.allow_fabricated,
            "Match validator initialized"
        );
        if !config.strict_mode {
            tracing::warn!("Lenient validation: labels outside the candidate set can pass");
        }
        Self {
            library,
            config,
            stats: Mutex::new(ValidationStats::default()),
        }
    }

    /// Validate `label` for `province`
    ///
    /// `candidates` overrides the library lookup for the target set.
    pub async fn validate(
        &self,
        label: Option<&str>,
        province: &str,
        candidates: Option<LabelSet>,
    ) -> Result<ValidationResult> {
        let label = match label.map(str::trim).filter(|l| !l.is_empty()) {
            Some(label) => label,
            None => {
                let mut stats = self.stats.lock().await;
                stats.total += 1;
                stats.passed += 1;
                return Ok(ValidationResult::empty(province));
            }
        };

        let target = match candidates {
            Some(set) => set,
            None => self.library.load(province, false).await?,
        };
        let cached = self.library.cached_snapshot().await;

        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        let in_target = target.contains(label);
        if !in_target {
            violations.push(Violation::NotInDatabase {
                label: label.to_string(),
                province: province.to_string(),
            });
        }

        if !self.config.allow_cross_province {
            let mut others: Vec<&str> = cached
                .iter()
                .filter(|(other, set)| other != province && set.contains(label))
                .map(|(other, _)| other.as_str())
                .collect();
            others.sort_unstable();

            if let Some(other) = others.first() {
                warnings.push(format!(
                    "label '{}' is also validated under province '{}'",
                    label, other
                ));
                if !in_target {
                    violations.push(Violation::CrossProvince {
                        label: label.to_string(),
                        province: province.to_string(),
                        other: other.to_string(),
                    });
                }
            }
        }

        if !self.config.allow_fabricated {
            let known = in_target || cached.iter().any(|(_, set)| set.contains(label));
            if !known {
                violations.push(Violation::Fabricated {
                    label: label.to_string(),
                });
            }
        }

        let passed = violations.is_empty() || (!self.config.strict_mode && warnings.is_empty());

        for violation in &violations {
            tracing::warn!(province, label, kind = violation.kind(), "Validation violation: {}", violation);
        }

        {
            let mut stats = self.stats.lock().await;
            stats.total += 1;
            if passed {
                stats.passed += 1;
            } else {
                stats.failed += 1;
            }
            for violation in &violations {
                *stats.by_type.entry(violation.kind().to_string()).or_insert(0) += 1;
            }
        }

        Ok(ValidationResult {
            passed,
            label: passed.then(|| label.to_string()),
            province: province.to_string(),
            violations,
            warnings,
        })
    }

    /// Validate many rows; rows without a province fail with `missing_province`
    pub async fn batch_validate(
        &self,
        items: &[ValidationItem],
    ) -> Result<(Vec<ValidationResult>, BatchValidationStats)> {
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let province = item.province.as_deref().map(str::trim).filter(|p| !p.is_empty());
            match province {
                Some(province) => {
                    results.push(self.validate(item.label.as_deref(), province, None).await?);
                }
                None => {
                    tracing::warn!(label = ?item.label, "Validation row without province");
                    results.push(ValidationResult {
                        passed: false,
                        label: None,
                        province: String::new(),
                        violations: vec![Violation::MissingProvince],
                        warnings: Vec::new(),
                    });
                }
            }
        }

        let total = results.len();
        let passed = results.iter().filter(|r| r.is_valid()).count();
        let mut violation_types = BTreeMap::new();
        for violation in results.iter().flat_map(|r| r.violations.iter()) {
            *violation_types.entry(violation.kind().to_string()).or_insert(0) += 1;
        }

        let stats = BatchValidationStats {
            total,
            passed,
            failed: total - passed,
            pass_rate: percentage(passed, total),
            violation_types,
        };

        Ok((results, stats))
    }

    pub async fn stats(&self) -> ValidationStats {
        self.stats.lock().await.clone()
    }

    pub async fn reset_stats(&self) {
        *self.stats.lock().await = ValidationStats::default();
        tracing::info!("Validation statistics reset");
    }
}
