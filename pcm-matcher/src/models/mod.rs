//! Data models for pcm-matcher
//!
//! Explicit field structs per persisted entity plus the per-item match outcome
//! types returned to callers.

pub mod candidate;
pub mod feedback;
pub mod match_attempt;
pub mod outcome;

pub use candidate::{CandidateLabel, CandidateUpdate, NewCandidate};
pub use feedback::{FeedbackEvent, FeedbackSummary, NewFeedback, UserChoice};
pub use match_attempt::{MatchAttempt, MatchStatistics, ValidationOutcome};
pub use outcome::{
    BatchItem, BatchSummary, ConfidenceTier, MatchFailure, MatchMethod, MatchOutcome, MatchRow,
};
