//! Positional last-resort parsing.
//!
//! When the label parser finds no anchored entries — badly degraded scans
//! where serials and EPICs did not survive recognition — the page usually
//! still shows age/gender pairs in reading order. Each pair becomes one
//! entry, with names and EPICs assigned positionally where present. Serial
//! numbers are unknown here and left at 0.

use std::sync::LazyLock;

use regex::Regex;

use super::structured::gender_code;
use crate::pipeline::types::{PageExtraction, RawVoter};

static AGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:आयु|उम्र)\s*[:：]?\s*(\d{1,3})").unwrap());

static GENDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"पुरुष|महिला|अन्य").unwrap());

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*नाम\s*[:：]?\s*(.+)$").unwrap());

static EPIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{2,3}\d{7}|[A-Z]{2}/\d+/\d+/\d+").unwrap());

/// Build entries from age/gender pairs in reading order. The entry count is
/// exactly the number of complete pairs.
pub fn parse_text(payload: &str) -> PageExtraction {
    let ages: Vec<i64> = AGE
        .captures_iter(payload)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    let genders: Vec<String> = GENDER
        .find_iter(payload)
        .map(|m| gender_code(m.as_str()))
        .collect();
    let names: Vec<String> = NAME
        .captures_iter(payload)
        .map(|c| c[1].trim().to_string())
        .collect();
    let epics: Vec<String> = EPIC
        .find_iter(payload)
        .map(|m| m.as_str().to_string())
        .collect();

    let voters = ages
        .iter()
        .zip(genders.iter())
        .enumerate()
        .map(|(i, (&age, gender))| RawVoter {
            serial: 0,
            epic: epics.get(i).cloned().unwrap_or_default(),
            name: names.get(i).cloned().unwrap_or_default(),
            age,
            gender: gender.clone(),
            ..Default::default()
        })
        .collect();

    PageExtraction {
        header: None,
        voters,
    }
}
