//! profile-digest domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: The daily ingestion-and-notification pipeline
//! - `policy`: Lookback window shared by post sources and the orchestrator

pub mod model;
pub mod policy;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;

use sha2::{Digest as _, Sha256};

/// Number of leading characters of a post that participate in its fingerprint
pub const FINGERPRINT_TEXT_CHARS: usize = 500;

/// Compute the content fingerprint of a post for a given profile
///
/// SHA-256 over `"{profile_id}:{first 500 chars of text}"`, hex encoded.
/// Truncation counts characters, not bytes, so multi-byte text is never split.
pub fn compute_fingerprint(profile_id: ProfileId, text: &str) -> String {
    let truncated: String = text.chars().take(FINGERPRINT_TEXT_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", profile_id, truncated).as_bytes());
    format!("{:x}", hasher.finalize())
}
