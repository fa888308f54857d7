//! Hashing helpers for duplicate detection and report cache keys

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of the raw comment content, used to index duplicate lookups
pub fn content_hash(content: &str) -> String {
    hash_string(content)
}

/// Cache key for a per-question stance report
pub fn stance_report_key(project_id: Uuid, question_id: &str) -> String {
    format!("{}:{}", project_id, hash_string(question_id))
}

/// Cache key for a whole-project report
pub fn project_report_key(project_id: Uuid) -> String {
    project_id.to_string()
}

/// Hash a string to a hex string using SHA256
fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}
