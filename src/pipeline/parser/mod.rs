//! Payload parsing for recognition output.
//!
//! The model is asked for JSON but delivers whatever it delivers: clean
//! JSON, JSON wrapped in code fences or prose, or plain labeled text.
//! Routing is by shape — payloads that look like JSON go through the
//! structured route (with embedded-object recovery), everything else
//! through the label parser with a positional last resort.

pub mod positional;
pub mod structured;

use super::types::PageExtraction;

/// Parse a raw recognition payload into a page extraction. Never fails:
/// unusable payloads yield an empty extraction.
pub fn parse_payload(payload: &str) -> PageExtraction {
    let stripped = structured::strip_code_fences(payload);

    if stripped.trim_start().starts_with('{') {
        return structured::parse_json(&stripped).unwrap_or_default();
    }

    let parsed = structured::parse_text(&stripped);
    if !parsed.voters.is_empty() {
        return parsed;
    }

    // The positional route invents record boundaries, so it only runs when
    // the text carries both a name label and an age label.
    if !structured::has_minimum_signal(&stripped) {
        return parsed;
    }

    let mut fallback = positional::parse_text(&stripped);
    // A label parse may still have found a header even with no entries.
    if fallback.header.is_none() {
        fallback.header = parsed.header;
    }
    fallback
}
