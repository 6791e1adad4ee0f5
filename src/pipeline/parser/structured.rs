//! Structured payload parsing.
//!
//! Two routes share this module: JSON payloads (the happy path, with
//! recovery for JSON embedded in prose) and plain text carrying the roll's
//! printed Hindi field labels.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::pipeline::header::HeaderInfo;
use crate::pipeline::types::{PageExtraction, RawVoter};

/// Serial numbers above this are treated as recognition noise — no real
/// roll part carries that many entries.
const MAX_SERIAL: i64 = 3000;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

// Entry anchor: serial number followed by an EPIC in either print format.
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(\d{1,4})[.)]?\s+([A-Z]{2,3}\d{7}|[A-Z]{2}/\d+/\d+/\d+)").unwrap()
});

// Line-anchored so पिता/पति का नाम lines do not match as the voter's name.
static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*नाम\s*[:：]?\s*(.+)$").unwrap());

static RELATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(पिता|पति|माता)\s*(?:का|की)?\s*नाम\s*[:：]?\s*(.+)").unwrap()
});

static HOUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"मकान\s*(?:संख्या|नं\.?)?\s*[:：]?\s*(\S+)").unwrap());

static AGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:आयु|उम्र)\s*[:：]?\s*(\d{1,3})").unwrap());

static GENDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"पुरुष|महिला|अन्य").unwrap());

// ──────────────────────────────────────────────
// JSON route
// ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageWire {
    header: Option<HeaderWire>,
    voters: Vec<RawVoter>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HeaderWire {
    ac_no_name: String,
    part_number: String,
    section_number: String,
    section_name: String,
    ps_name: String,
    gram: String,
    thana: String,
    panchayat: String,
    block: String,
    tahsil: String,
    jilla: String,
}

impl From<HeaderWire> for HeaderInfo {
    fn from(w: HeaderWire) -> Self {
        HeaderInfo {
            ac_no_name: w.ac_no_name,
            part_number: w.part_number,
            section_number: w.section_number,
            section_name: w.section_name,
            ps_name: w.ps_name,
            state: String::new(),
            gram: w.gram,
            thana: w.thana,
            panchayat: w.panchayat,
            block: w.block,
            tahsil: w.tahsil,
            jilla: w.jilla,
        }
    }
}

/// Remove a surrounding code fence, if any. The model frequently wraps its
/// JSON in ```json ... ``` despite being told not to.
pub fn strip_code_fences(payload: &str) -> String {
    match FENCE.captures(payload) {
        Some(caps) => caps[1].to_string(),
        None => payload.to_string(),
    }
}

/// Parse a JSON payload into a page extraction, recovering an embedded
/// object when the payload is not pure JSON. `None` means nothing usable.
pub fn parse_json(payload: &str) -> Option<PageExtraction> {
    let value = recover_json(payload)?;
    let wire: PageWire = serde_json::from_value(value).ok()?;

    let header = wire
        .header
        .map(HeaderInfo::from)
        .filter(|h| !h.is_empty());
    let voters = wire
        .voters
        .into_iter()
        .filter(|v| v.serial <= MAX_SERIAL)
        .collect();

    Some(PageExtraction { header, voters })
}

/// Direct parse first; on failure, the largest brace-delimited substring.
fn recover_json(payload: &str) -> Option<Value> {
    let trimmed = payload.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

// ──────────────────────────────────────────────
// Labeled-text route
// ──────────────────────────────────────────────

/// Parse plain text carrying the roll's printed labels. Entries are anchored
/// on `serial + EPIC` pairs; fields are picked out of each entry's block.
pub fn parse_text(payload: &str) -> PageExtraction {
    let anchors: Vec<_> = ANCHOR.captures_iter(payload).collect();
    let mut voters = Vec::new();

    for (i, caps) in anchors.iter().enumerate() {
        let serial: i64 = match caps[1].parse() {
            Ok(n) if (1..=MAX_SERIAL).contains(&n) => n,
            _ => continue,
        };
        let epic = caps[2].to_string();

        let block_start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let block_end = anchors
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(payload.len());
        let block = &payload[block_start..block_end];

        voters.push(RawVoter {
            serial,
            epic,
            name: capture_first(&NAME, block),
            relation_type: relation_type(block),
            relation_name: RELATION
                .captures(block)
                .map(|c| c[2].trim().to_string())
                .unwrap_or_default(),
            house: capture_first(&HOUSE, block),
            age: AGE
                .captures(block)
                .and_then(|c| c[1].parse().ok())
                .unwrap_or(0),
            gender: GENDER
                .find(block)
                .map(|m| gender_code(m.as_str()))
                .unwrap_or_default(),
        });
    }

    PageExtraction {
        header: None,
        voters,
    }
}

/// Text worth parsing at all: a name label and an age label.
pub fn has_minimum_signal(payload: &str) -> bool {
    payload.contains("नाम") && AGE.is_match(payload)
}

fn capture_first(re: &Regex, block: &str) -> String {
    re.captures(block)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default()
}

fn relation_type(block: &str) -> String {
    match RELATION.captures(block).map(|c| c[1].to_string()).as_deref() {
        Some("पिता") => "Father".to_string(),
        Some("पति") => "Husband".to_string(),
        Some("माता") => "Mother".to_string(),
        _ => String::new(),
    }
}

pub(crate) fn gender_code(word: &str) -> String {
    match word {
        "पुरुष" => "M".to_string(),
        "महिला" => "F".to_string(),
        "अन्य" => "O".to_string(),
        _ => String::new(),
    }
}
