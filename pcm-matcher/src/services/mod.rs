//! Matching services
//!
//! Caches, resolver clients, validation and the matcher that ties them
//! together. Components share state through `Arc` handles built in
//! [`crate::AppState`].

pub mod candidate_library;
pub mod confirmed_mappings;
pub mod feedback_store;
pub mod input_guard;
pub mod llm_resolver;
pub mod matcher;
pub mod province_cache;
pub mod resolver;
pub mod validator;

pub use candidate_library::{CandidateLibrary, LabelSet};
pub use confirmed_mappings::{
    ConfirmedMapping, ConfirmedMappingIndex, HistoryExample, MappingSettings,
};
pub use feedback_store::FeedbackStore;
pub use llm_resolver::LlmResolver;
pub use matcher::{Matcher, MatcherSettings};
pub use resolver::{Resolver, ResolverError, ResolverProposal, ResolverRequest, TokenUsage};
pub use validator::{
    BatchValidationStats, MatchValidator, ValidationItem, ValidationResult, ValidationStats,
    Violation,
};
