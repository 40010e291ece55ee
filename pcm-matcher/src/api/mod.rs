//! HTTP API handlers for pcm-matcher

pub mod cache;
pub mod feedback;
pub mod health;
pub mod matching;
pub mod review;
pub mod settings;
pub mod stats;

pub use cache::cache_routes;
pub use feedback::feedback_routes;
pub use health::health_routes;
pub use matching::match_routes;
pub use review::review_routes;
pub use settings::settings_routes;
pub use stats::stats_routes;

/// Province names are normalized at the HTTP boundary only
///
/// Unknown names pass through trimmed; the core treats them as provinces
/// without candidates.
pub(crate) fn normalize_province(raw: &str) -> String {
    pcm_common::province::normalize_province(raw)
        .map(str::to_string)
        .unwrap_or_else(|| raw.trim().to_string())
}

fn default_true() -> bool {
    true
}

fn default_days() -> u32 {
    30
}
