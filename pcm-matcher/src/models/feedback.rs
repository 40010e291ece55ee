//! Reviewer feedback events
//!
//! Feedback is append-only. Accepted events with a final label are the only
//! input to confirmed mappings.

use chrono::{DateTime, Utc};
use pcm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ConfidenceTier;

/// Reviewer decision on a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserChoice {
    /// Recommendation accepted as-is
    Accept,
    /// Recommendation rejected, nothing chosen
    Reject,
    /// A different label was chosen
    Modify,
    /// Explicitly left empty
    Empty,
}

impl UserChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserChoice::Accept => "accept",
            UserChoice::Reject => "reject",
            UserChoice::Modify => "modify",
            UserChoice::Empty => "empty",
        }
    }
}

impl fmt::Display for UserChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accept" => Ok(UserChoice::Accept),
            "reject" => Ok(UserChoice::Reject),
            "modify" => Ok(UserChoice::Modify),
            "empty" => Ok(UserChoice::Empty),
            other => Err(Error::InvalidInput(format!("Unknown user choice: {}", other))),
        }
    }
}

/// Feedback to append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub province: String,
    pub full_name: String,
    #[serde(default)]
    pub recommended_label: Option<String>,
    pub user_choice: UserChoice,
    #[serde(default)]
    pub final_label: Option<String>,
    /// Confidence tier shown to the reviewer
    #[serde(default)]
    pub confidence: Option<ConfidenceTier>,
    #[serde(default)]
    pub candidate_count: u32,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Defaults to the write time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewFeedback {
    /// Accepted recommendation
    pub fn accept(
        province: impl Into<String>,
        full_name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let label = label.into();
        Self {
            province: province.into(),
            full_name: full_name.into(),
            recommended_label: Some(label.clone()),
            user_choice: UserChoice::Accept,
            final_label: Some(label),
            confidence: None,
            candidate_count: 0,
            batch_id: None,
            session_id: None,
            created_at: None,
        }
    }

    /// Reviewer chose `label` instead of the recommendation
    pub fn modify(
        province: impl Into<String>,
        full_name: impl Into<String>,
        recommended: Option<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            recommended_label: recommended,
            user_choice: UserChoice::Modify,
            final_label: Some(label.into()),
            ..Self::accept(province, full_name, "")
        }
    }

    /// Recommendation rejected
    pub fn reject(
        province: impl Into<String>,
        full_name: impl Into<String>,
        recommended: Option<String>,
    ) -> Self {
        Self {
            recommended_label: recommended,
            user_choice: UserChoice::Reject,
            final_label: None,
            ..Self::accept(province, full_name, "")
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn in_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// Check field combinations before the event is persisted
    ///
    /// `accept`/`modify` need a final label, `empty` must not carry one.
    pub fn validate(&self) -> Result<()> {
        if self.province.trim().is_empty() {
            return Err(Error::InvalidInput("Feedback province is empty".to_string()));
        }
        if self.full_name.trim().is_empty() {
            return Err(Error::InvalidInput("Feedback full name is empty".to_string()));
        }

        let has_final = self
            .final_label
            .as_deref()
            .map(|l| !l.trim().is_empty())
            .unwrap_or(false);

        match self.user_choice {
            UserChoice::Accept | UserChoice::Modify if !has_final => Err(Error::InvalidInput(
                format!("'{}' feedback requires a final label", self.user_choice),
            )),
            UserChoice::Empty if has_final => Err(Error::InvalidInput(
                "'empty' feedback must not carry a final label".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Stored feedback event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: i64,
    pub province: String,
    pub full_name: String,
    pub recommended_label: Option<String>,
    pub user_choice: UserChoice,
    pub final_label: Option<String>,
    pub confidence: Option<ConfidenceTier>,
    pub candidate_count: u32,
    pub batch_id: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Choice counts over a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub modified: usize,
    pub empty: usize,
    /// Percentage of accepted events, two decimals
    pub acceptance_rate: f64,
}

impl FeedbackSummary {
    pub fn from_events(events: &[FeedbackEvent]) -> Self {
        let count = |choice: UserChoice| events.iter().filter(|e| e.user_choice == choice).count();
        let total = events.len();
        let accepted = count(UserChoice::Accept);

        Self {
            total,
            accepted,
            rejected: count(UserChoice::Reject),
            modified: count(UserChoice::Modify),
            empty: count(UserChoice::Empty),
            acceptance_rate: percentage(accepted, total),
        }
    }
}

/// Percentage rounded to two decimals; 0 for an empty total
pub(crate) fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_requires_final_label() {
        let mut feedback = NewFeedback::accept("上海", "上海云湖医药连锁经营有限公司", "云湖医药");
        assert!(feedback.validate().is_ok());

        feedback.final_label = Some("  ".to_string());
        assert!(matches!(feedback.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_forbids_final_label() {
        let mut feedback = NewFeedback::reject("上海", "某药房", None);
        feedback.user_choice = UserChoice::Empty;
        assert!(feedback.validate().is_ok());

        feedback.final_label = Some("云湖医药".to_string());
        assert!(feedback.validate().is_err());
    }

    #[test]
    fn test_modify_keeps_recommendation() {
        let feedback = NewFeedback::modify("四川", "某药房", Some("老百姓大药房".to_string()), "九州通好药师");
        assert_eq!(feedback.user_choice, UserChoice::Modify);
        assert_eq!(feedback.recommended_label.as_deref(), Some("老百姓大药房"));
        assert_eq!(feedback.final_label.as_deref(), Some("九州通好药师"));
        assert!(feedback.validate().is_ok());
    }

    #[test]
    fn test_user_choice_roundtrip_names() {
        for choice in [UserChoice::Accept, UserChoice::Reject, UserChoice::Modify, UserChoice::Empty] {
            assert_eq!(choice.as_str().parse::<UserChoice>().unwrap(), choice);
        }
        assert!("maybe".parse::<UserChoice>().is_err());
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 5), 100.0);
    }
}
