//! # PCM Common Library
//!
//! Shared code for the pharmacy-chain matcher crates:
//! - Error and result types
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Province vocabulary and normalization
//! - Timestamp helpers for persisted records

pub mod config;
pub mod error;
pub mod province;
pub mod time;

pub use error::{Error, Result};
