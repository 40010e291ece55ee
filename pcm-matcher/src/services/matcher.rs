//! Full name → label matching
//!
//! Per item: input checks, province vocabulary, confirmed-mapping shortcut,
//! resolver proposal under a timeout, closed-world validation. Every call to
//! [`Matcher::match_one`] appends exactly one attempt to the audit log.
//! Per-item problems become [`MatchFailure`] outcomes; only store errors are
//! returned as `Err`.

use pcm_common::config::MatchingConfig;
use pcm_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::candidate_library::{CandidateLibrary, LabelSet};
use super::confirmed_mappings::ConfirmedMappingIndex;
use super::input_guard;
use super::resolver::{Resolver, ResolverError, ResolverProposal, ResolverRequest};
use super::validator::MatchValidator;
use crate::models::{
    BatchItem, BatchSummary, ConfidenceTier, MatchAttempt, MatchFailure, MatchMethod, MatchOutcome,
    ValidationOutcome,
};

#[derive(Debug, Clone)]
pub struct MatcherSettings {
    pub enable_history: bool,
    pub resolver_timeout: Duration,
    pub max_history_examples: usize,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self::from(&MatchingConfig::default())
    }
}

impl From<&MatchingConfig> for MatcherSettings {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            enable_history: config.enable_history,
            resolver_timeout: Duration::from_secs(config.resolver_timeout_secs),
            max_history_examples: config.max_history_examples.min(5),
        }
    }
}

pub struct Matcher {
    db: SqlitePool,
    library: Arc<CandidateLibrary>,
    mappings: Arc<ConfirmedMappingIndex>,
    validator: Arc<MatchValidator>,
    resolver: RwLock<Option<Arc<dyn Resolver>>>,
    settings: MatcherSettings,
}

impl Matcher {
    pub fn new(
        db: SqlitePool,
        library: Arc<CandidateLibrary>,
        mappings: Arc<ConfirmedMappingIndex>,
        validator: Arc<MatchValidator>,
        resolver: Option<Arc<dyn Resolver>>,
        settings: MatcherSettings,
    ) -> Self {
        Self {
            db,
            library,
            mappings,
            validator,
            resolver: RwLock::new(resolver),
            settings,
        }
    }

    /// Install or replace the resolver (e.g. after an API key update)
    pub async fn set_resolver(&self, resolver: Arc<dyn Resolver>) {
        tracing::info!(resolver = resolver.name(), "Resolver installed");
        *self.resolver.write().await = Some(resolver);
    }

    pub async fn has_resolver(&self) -> bool {
        self.resolver.read().await.is_some()
    }

    /// Match one full name within `province`
    ///
    /// `candidates` skips the library lookup when the caller already holds
    /// the province set.
    pub async fn match_one(
        &self,
        full_name: &str,
        province: &str,
        candidates: Option<LabelSet>,
        use_history: bool,
    ) -> Result<MatchOutcome> {
        let full_name = full_name.trim();
        let province = province.trim();

        if let Err(reason) =
            input_guard::check_full_name(full_name).and_then(|_| input_guard::check_province(province))
        {
            tracing::debug!(full_name, province, "Input rejected: {}", reason);
            let outcome = MatchOutcome::failed(
                full_name,
                province,
                MatchMethod::Skipped,
                MatchFailure::InvalidInput(reason),
            );
            return self.finish(outcome, None, ValidationOutcome::NotRun, None).await;
        }

        let candidates = match candidates {
            Some(set) => set,
            None => self.library.load(province, false).await?,
        };

        if candidates.is_empty() {
            tracing::warn!(province, "Province has no candidate labels");
            let outcome = MatchOutcome::failed(
                full_name,
                province,
                MatchMethod::Skipped,
                MatchFailure::NoCandidatesForProvince,
            );
            return self.finish(outcome, None, ValidationOutcome::NotRun, None).await;
        }

        let history = use_history && self.settings.enable_history;

        if history {
            if let Some(mapping) = self.mappings.lookup(province, full_name).await? {
                if candidates.contains(&mapping.label) {
                    tracing::info!(
                        full_name,
                        province,
                        label = %mapping.label,
                        confirmations = mapping.confirmation_count,
                        "Matched from confirmed mapping"
                    );
                    let outcome = MatchOutcome {
                        full_name: full_name.to_string(),
                        province: province.to_string(),
                        label: Some(mapping.label.clone()),
                        confidence: mapping.confidence,
                        method: MatchMethod::Memo,
                        rationale: Some(format!("confirmed {} times", mapping.confirmation_count)),
                        failure: None,
                        warnings: Vec::new(),
                    };
                    return self
                        .finish(outcome, Some(mapping.label), ValidationOutcome::Passed, None)
                        .await;
                }

                tracing::warn!(
                    full_name,
                    province,
                    label = %mapping.label,
                    "Confirmed label is no longer a candidate, asking resolver"
                );
            }
        }

        let examples = if history {
            self.mappings
                .history_examples(province, self.settings.max_history_examples)
                .await?
        } else {
            Vec::new()
        };

        let request = ResolverRequest {
            full_name: full_name.to_string(),
            province: province.to_string(),
            candidates: candidates.iter().cloned().collect(),
            history: examples,
        };

        let proposal = match self.propose(&request).await {
            Ok(proposal) => proposal,
            Err(e) => {
                tracing::warn!(full_name, province, "Resolver failure: {}", e);
                let outcome = MatchOutcome::failed(
                    full_name,
                    province,
                    MatchMethod::Resolver,
                    MatchFailure::ResolverFailure(e.to_string()),
                );
                return self.finish(outcome, None, ValidationOutcome::NotRun, None).await;
            }
        };

        let Some(proposed) = proposal.label.clone() else {
            tracing::info!(full_name, province, "Resolver found no match");
            let outcome = MatchOutcome {
                full_name: full_name.to_string(),
                province: province.to_string(),
                label: None,
                confidence: ConfidenceTier::Low,
                method: MatchMethod::Resolver,
                rationale: Some(proposal.rationale.clone()).filter(|r| !r.is_empty()),
                failure: None,
                warnings: Vec::new(),
            };
            return self
                .finish(outcome, None, ValidationOutcome::NotRun, Some(&proposal))
                .await;
        };

        let validation = self
            .validator
            .validate(Some(&proposed), province, Some(Arc::clone(&candidates)))
            .await?;

        if !validation.passed {
            let violations = validation.violation_messages();
            let mut outcome = MatchOutcome::failed(
                full_name,
                province,
                MatchMethod::Resolver,
                MatchFailure::ValidationViolation(violations.clone()),
            );
            outcome.rationale = Some(proposal.rationale.clone()).filter(|r| !r.is_empty());
            outcome.warnings = validation.warnings;
            return self
                .finish(
                    outcome,
                    Some(proposed),
                    ValidationOutcome::Failed(violations),
                    Some(&proposal),
                )
                .await;
        }

        let outcome = MatchOutcome {
            full_name: full_name.to_string(),
            province: province.to_string(),
            label: validation.label,
            confidence: proposal.confidence,
            method: MatchMethod::Resolver,
            rationale: Some(proposal.rationale.clone()).filter(|r| !r.is_empty()),
            failure: None,
            warnings: validation.warnings,
        };
        self.finish(outcome, Some(proposed), ValidationOutcome::Passed, Some(&proposal))
            .await
    }

    /// Match a batch; output order and length follow the input
    ///
    /// Each province's candidates are loaded once per batch. Rows missing a
    /// field become `missing_fields` outcomes without a resolver call or an
    /// audit record.
    pub async fn batch_match(&self, items: &[BatchItem], use_history: bool) -> Result<Vec<MatchOutcome>> {
        let mut sets: HashMap<String, LabelSet> = HashMap::new();
        for (_, province) in items.iter().filter_map(BatchItem::fields) {
            let province = province.trim();
            if !sets.contains_key(province) {
                let set = self.library.load(province, false).await?;
                sets.insert(province.to_string(), set);
            }
        }

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let outcome = match item.fields() {
                Some((full_name, province)) => {
                    let set = sets.get(province.trim()).cloned();
                    self.match_one(full_name, province, set, use_history).await?
                }
                None => {
                    tracing::warn!(
                        full_name = ?item.full_name,
                        province = ?item.province,
                        "Batch row missing required fields"
                    );
                    MatchOutcome::failed(
                        item.full_name.clone().unwrap_or_default(),
                        item.province.clone().unwrap_or_default(),
                        MatchMethod::Skipped,
                        MatchFailure::MissingFields,
                    )
                }
            };
            outcomes.push(outcome);
        }

        let summary = BatchSummary::from_outcomes(&outcomes);
        tracing::info!(
            total = summary.total,
            matched = summary.matched,
            empty = summary.empty,
            provinces = sets.len(),
            "Batch match complete"
        );

        Ok(outcomes)
    }

    async fn propose(&self, request: &ResolverRequest) -> std::result::Result<ResolverProposal, ResolverError> {
        let resolver = self
            .resolver
            .read()
            .await
            .clone()
            .ok_or_else(|| ResolverError::NotConfigured("no resolver API key".to_string()))?;

        match tokio::time::timeout(self.settings.resolver_timeout, resolver.propose(request)).await {
            Ok(result) => result,
            Err(_) => Err(ResolverError::Timeout(self.settings.resolver_timeout.as_secs())),
        }
    }

    async fn finish(
        &self,
        outcome: MatchOutcome,
        proposed: Option<String>,
        validation: ValidationOutcome,
        proposal: Option<&ResolverProposal>,
    ) -> Result<MatchOutcome> {
        let mut attempt = MatchAttempt::from_outcome(&outcome, proposed, validation);
        if let Some(proposal) = proposal {
            attempt.resolver_model = proposal.model.clone();
            if let Some(usage) = proposal.usage {
                attempt.prompt_tokens = Some(usage.prompt_tokens);
                attempt.completion_tokens = Some(usage.completion_tokens);
            }
        }

        crate::db::match_records::append_attempt(&self.db, &attempt).await?;
        Ok(outcome)
    }
}
