//! Core data types for the extraction pipeline.

use serde::{Deserialize, Serialize};

use super::classify::{classify, valid_age};
use super::header::HeaderInfo;
use crate::db::DatabaseError;
use crate::transliterate::hindi_to_english;

// ──────────────────────────────────────────────
// Job
// ──────────────────────────────────────────────

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DatabaseError::InvalidEnum {
                field: "jobs.status".into(),
                value: other.into(),
            }),
        }
    }
}

/// One batch of documents submitted together, tracked end-to-end.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// 0–100, monotonic non-decreasing while processing.
    pub progress: u32,
    /// All documents discovered in the archive, including undersized ones.
    pub total_units: u32,
    pub processed_units: u32,
    pub skipped_units: u32,
    pub extracted_count: u32,
    pub avg_unit_time_ms: u64,
    pub started_at: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    /// Units still eligible for processing (discovered minus skipped).
    pub fn eligible_units(&self) -> u32 {
        self.total_units.saturating_sub(self.skipped_units)
    }

    /// Live ETA in milliseconds, computed from the rolling per-unit average
    /// and the outer concurrency bound. `None` before the first unit lands.
    pub fn eta_ms(&self, outer_concurrency: u32) -> Option<u64> {
        if self.avg_unit_time_ms == 0 || outer_concurrency == 0 {
            return None;
        }
        let remaining = self.eligible_units().saturating_sub(self.processed_units) as u64;
        Some(remaining * self.avg_unit_time_ms / outer_concurrency as u64)
    }
}

/// Partial update for a job row — only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u32>,
    pub total_units: Option<u32>,
    pub processed_units: Option<u32>,
    pub skipped_units: Option<u32>,
    pub extracted_count: Option<u32>,
    pub avg_unit_time_ms: Option<u64>,
    pub started_at: Option<String>,
    /// `Some(None)` clears the message, `Some(Some(_))` sets it.
    pub error_message: Option<Option<String>>,
}

// ──────────────────────────────────────────────
// Records
// ──────────────────────────────────────────────

/// Data-quality status of an extracted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Verified,
    Flagged,
    Incomplete,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Verified => "verified",
            RecordStatus::Flagged => "flagged",
            RecordStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "verified" => Ok(RecordStatus::Verified),
            "flagged" => Ok(RecordStatus::Flagged),
            "incomplete" => Ok(RecordStatus::Incomplete),
            other => Err(DatabaseError::InvalidEnum {
                field: "voter_records.status".into(),
                value: other.into(),
            }),
        }
    }
}

/// One voter entry as the recognition layer yields it — wire shape, all
/// fields optional with empty/zero defaults so degraded pages never crash.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawVoter {
    pub serial: i64,
    pub epic: String,
    pub name: String,
    #[serde(rename = "relationType")]
    pub relation_type: String,
    #[serde(rename = "relationName")]
    pub relation_name: String,
    pub house: String,
    pub age: i64,
    /// "M", "F" or "O".
    pub gender: String,
}

/// One structured voter record ready for persistence.
#[derive(Debug, Clone, Serialize)]
pub struct VoterRecord {
    pub job_id: String,
    pub serial_number: i64,
    pub epic_number: String,
    pub voter_name: String,
    pub voter_name_en: String,
    pub relation_type: String,
    pub relation_name: String,
    pub relation_name_en: String,
    pub gender: String,
    pub age: Option<u32>,
    pub house_no: String,
    pub address: String,
    pub booth_number: String,
    pub part_number: String,
    pub ac_no_name: String,
    pub section_number: String,
    pub section_name: String,
    pub ps_name: String,
    pub state: String,
    pub gram: String,
    pub thana: String,
    pub panchayat: String,
    pub block: String,
    pub tahsil: String,
    pub jilla: String,
    pub status: RecordStatus,
}

impl VoterRecord {
    /// Build a persistable record from a raw extracted voter plus the
    /// effective header for its unit.
    pub fn from_raw(raw: &RawVoter, job_id: &str, booth: &str, header: &HeaderInfo) -> Self {
        let status = classify(&raw.epic, &raw.name, raw.age);

        let gender = match raw.gender.as_str() {
            "M" => "Male".to_string(),
            "F" => "Female".to_string(),
            other => other.to_string(),
        };

        let name = if raw.name.is_empty() {
            "Unknown".to_string()
        } else {
            raw.name.clone()
        };

        let address = if raw.house.is_empty() {
            String::new()
        } else {
            format!("House No. {}", raw.house)
        };

        VoterRecord {
            job_id: job_id.to_string(),
            serial_number: raw.serial.max(0),
            epic_number: raw.epic.clone(),
            voter_name_en: hindi_to_english(&name),
            voter_name: name,
            relation_type: raw.relation_type.clone(),
            relation_name_en: hindi_to_english(&raw.relation_name),
            relation_name: raw.relation_name.clone(),
            gender,
            age: valid_age(raw.age),
            house_no: raw.house.clone(),
            address,
            booth_number: booth.to_string(),
            part_number: booth.to_string(),
            ac_no_name: header.ac_no_name.clone(),
            section_number: header.section_number.clone(),
            section_name: header.section_name.clone(),
            ps_name: header.ps_name.clone(),
            state: header.state.clone(),
            gram: hindi_to_english(&header.gram),
            thana: hindi_to_english(&header.thana),
            panchayat: hindi_to_english(&header.panchayat),
            block: hindi_to_english(&header.block),
            tahsil: hindi_to_english(&header.tahsil),
            jilla: hindi_to_english(&header.jilla),
            status,
        }
    }
}

// ──────────────────────────────────────────────
// Pipeline intermediates
// ──────────────────────────────────────────────

/// One document discovered inside a job's archive. Transient — exists only
/// as scheduler input.
#[derive(Debug, Clone)]
pub struct UnitCandidate {
    pub path: std::path::PathBuf,
    pub size: u64,
    /// Filename-embedded sequence number, 0 if absent.
    pub order_key: u64,
}

/// Extraction output for one page image.
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub header: Option<HeaderInfo>,
    pub voters: Vec<RawVoter>,
}

/// Extraction output for one document. Raw voters are turned into records
/// by the scheduler, after this unit's header has been merged into the
/// job-level header.
#[derive(Debug)]
pub struct UnitResult {
    pub voters: Vec<RawVoter>,
    pub pages_processed: usize,
    /// Booth number read from the unit's filename.
    pub booth: String,
    /// Header found on this unit's pages, if any.
    pub header: Option<HeaderInfo>,
}
