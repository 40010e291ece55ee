//! Test Helper Utilities
//!
//! Shared utilities for testing pcm-matcher

#![allow(dead_code)]

pub mod db_utils;
pub mod mock_resolver;

pub use db_utils::{build_state, count_rows, create_test_db, seed_candidates, seed_accepts};
pub use mock_resolver::{MockResolver, Scripted};
