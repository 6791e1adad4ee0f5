//! Record quality classification.
//!
//! A pure function of field presence — no external state. The three-way rule:
//! `verified` iff epic AND name present AND age in [18, 120];
//! else `flagged` iff epic OR name present; else `incomplete`.

use super::types::RecordStatus;

/// Voter ages outside this range are treated as recognition noise.
pub const MIN_AGE: i64 = 18;
pub const MAX_AGE: i64 = 120;

/// Classify a raw extracted voter by field presence.
pub fn classify(epic: &str, name: &str, age: i64) -> RecordStatus {
    let has_epic = !epic.trim().is_empty();
    let has_name = !name.trim().is_empty();
    let valid_age = (MIN_AGE..=MAX_AGE).contains(&age);

    if has_epic && has_name && valid_age {
        RecordStatus::Verified
    } else if has_epic || has_name {
        RecordStatus::Flagged
    } else {
        RecordStatus::Incomplete
    }
}

/// Age as stored on a record: only plausible values are kept.
pub fn valid_age(age: i64) -> Option<u32> {
    if (MIN_AGE..=MAX_AGE).contains(&age) {
        Some(age as u32)
    } else {
        None
    }
}
