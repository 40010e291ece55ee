//! Resolver contract
//!
//! A resolver turns (full name, province, candidate list) into a proposed
//! label. Proposals are untrusted: acceptance is decided by the validator,
//! never by the resolver's own confidence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::confirmed_mappings::HistoryExample;
use crate::models::ConfidenceTier;

/// Resolver errors
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Response arrived but did not contain a usable JSON object
    #[error("Malformed response: {0}")]
    ParseError(String),

    #[error("Resolver timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Resolver not configured: {0}")]
    NotConfigured(String),
}

/// Input handed to a resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverRequest {
    pub full_name: String,
    pub province: String,
    /// Sorted candidate labels of the province
    pub candidates: Vec<String>,
    /// At most five confirmed examples
    pub history: Vec<HistoryExample>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// What the resolver proposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverProposal {
    /// `None` when the resolver found no match
    pub label: Option<String>,
    pub confidence: ConfidenceTier,
    pub rationale: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ResolverProposal {
    /// Proposal with no label
    pub fn empty(rationale: impl Into<String>) -> Self {
        Self {
            label: None,
            confidence: ConfidenceTier::Low,
            rationale: rationale.into(),
            model: None,
            usage: None,
        }
    }
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    async fn propose(&self, request: &ResolverRequest) -> Result<ResolverProposal, ResolverError>;
}

#[derive(Deserialize)]
struct RawProposal {
    #[serde(default)]
    abbreviation: Option<serde_json::Value>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse the resolver's text answer
///
/// The outermost `{...}` span is taken as JSON. Blank or null labels become
/// `None`; an unrecognised confidence becomes Low. No JSON object, or invalid
/// JSON, is a [`ResolverError::ParseError`].
pub fn parse_proposal(text: &str) -> Result<ResolverProposal, ResolverError> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => {
            return Err(ResolverError::ParseError(format!(
                "no JSON object in response: {}",
                truncate(text, 200)
            )))
        }
    };

    let raw: RawProposal = serde_json::from_str(&text[start..=end])
        .map_err(|e| ResolverError::ParseError(format!("invalid JSON: {}", e)))?;

    let label = match raw.abbreviation {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => {
            return Err(ResolverError::ParseError(format!(
                "abbreviation is not a string: {}",
                other
            )))
        }
    };

    let confidence = raw
        .confidence
        .as_deref()
        .map(ConfidenceTier::parse_lenient)
        .unwrap_or(ConfidenceTier::Low);

    Ok(ResolverProposal {
        label,
        confidence,
        rationale: raw.reasoning.unwrap_or_default(),
        model: None,
        usage: None,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
