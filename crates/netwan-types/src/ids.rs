//! Prefixed ID generation.
//!
//! All entity IDs use a `prefix_` followed by a UUIDv7 (time-ordered).
//! This makes IDs globally unique, sortable by creation time, and instantly
//! identifiable by type when reading logs or the decision audit trail.

use uuid::Uuid;

/// Generate a prefixed ID using UUIDv7.
fn prefixed_id(prefix: &str) -> String {
    let id = Uuid::now_v7();
    format!("{}_{}", prefix, id.as_simple())
}

/// Generate a member (uplink) ID: `mem_<uuid7>`
pub fn member_id() -> String {
    prefixed_id("mem")
}

/// Generate a decision record ID: `dec_<uuid7>`
pub fn decision_id() -> String {
    prefixed_id("dec")
}

/// Generate a detected pattern ID: `pat_<uuid7>`
pub fn pattern_id() -> String {
    prefixed_id("pat")
}

/// Generate a root-cause analysis ID: `rc_<uuid7>`
pub fn root_cause_id() -> String {
    prefixed_id("rc")
}
