//! Archive extraction and document discovery.
//!
//! A batch arrives as a `.tar.gz` of scanned roll PDFs. Extraction unpacks
//! into a scratch directory; discovery then walks it recursively, filters
//! out junk entries, and derives a deterministic processing order from the
//! booth number embedded in each filename.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use regex::Regex;
use tracing::debug;

use super::error::PipelineError;
use super::types::UnitCandidate;

/// Files smaller than this are treated as empty scans and skipped.
pub const MIN_UNIT_SIZE: u64 = 500;

static BOOTH_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)HIN-(\d+)").unwrap());
static ANY_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());

/// Unpack a `.tar.gz` archive into `dest`, entry by entry. The wall-clock
/// budget is checked between entries so a decompression bomb cannot hold
/// the pipeline indefinitely.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    timeout: Duration,
) -> Result<(), PipelineError> {
    let deadline = Instant::now() + timeout;
    let file = File::open(archive_path)
        .map_err(|e| PipelineError::Archive(format!("cannot open archive: {e}")))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    std::fs::create_dir_all(dest)?;
    let entries = archive
        .entries()
        .map_err(|e| PipelineError::Archive(format!("cannot read archive: {e}")))?;
    for entry in entries {
        if Instant::now() > deadline {
            return Err(PipelineError::Archive("archive extraction timed out".into()));
        }
        let mut entry =
            entry.map_err(|e| PipelineError::Archive(format!("cannot read archive entry: {e}")))?;
        entry
            .unpack_in(dest)
            .map_err(|e| PipelineError::Archive(format!("cannot unpack entry: {e}")))?;
    }
    Ok(())
}

/// Walk `dir` recursively and collect every PDF, in a deterministic order.
///
/// Hidden files, macOS resource forks (`._*`) and `__MACOSX` directories are
/// ignored. Directory entries are visited in sorted name order so discovery
/// order is stable across filesystems.
pub fn discover_units(dir: &Path) -> Result<Vec<UnitCandidate>, PipelineError> {
    let mut found = Vec::new();
    walk(dir, &mut found)?;
    debug!(count = found.len(), dir = %dir.display(), "discovered documents");
    Ok(found)
}

fn walk(dir: &Path, out: &mut Vec<UnitCandidate>) -> Result<(), PipelineError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if name.starts_with('.') || name.starts_with("._") || name == "__MACOSX" {
            continue;
        }
        if path.is_dir() {
            walk(&path, out)?;
            continue;
        }
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }
        let size = std::fs::metadata(&path)?.len();
        let order_key = order_key_for(name);
        out.push(UnitCandidate {
            path,
            size,
            order_key,
        });
    }
    Ok(())
}

/// Sequence number derived from a filename: `HIN-<n>` wins, otherwise the
/// first digit run, otherwise 0.
pub fn order_key_for(filename: &str) -> u64 {
    if let Some(caps) = BOOTH_KEY.captures(filename) {
        if let Ok(n) = caps[1].parse() {
            return n;
        }
    }
    if let Some(caps) = ANY_NUMBER.captures(filename) {
        if let Ok(n) = caps[1].parse() {
            return n;
        }
    }
    0
}

/// Booth number for a unit, read from its filename. Falls back to the bare
/// order key when no `HIN-` marker is present.
pub fn booth_number_for(filename: &str) -> String {
    if let Some(caps) = BOOTH_KEY.captures(filename) {
        return caps[1].to_string();
    }
    if let Some(caps) = ANY_NUMBER.captures(filename) {
        return caps[1].to_string();
    }
    String::new()
}

/// Stable sort by order key; discovery order breaks ties.
pub fn sort_units(units: &mut [UnitCandidate]) {
    units.sort_by_key(|u| u.order_key);
}
