//! # taskflow-core
//!
//! Core types, traits, configuration, and error handling for TaskFlow.

pub mod config;
pub mod due;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod timezone;
pub mod traits;

pub use config::shellexpand;
pub use identity::normalize_user_id;
