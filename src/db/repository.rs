//! Job and voter-record persistence.

use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::warn;

use super::DatabaseError;
use crate::pipeline::types::{Job, JobPatch, JobStatus, RecordStatus, VoterRecord};

/// Records are inserted in transactional chunks of this size so a single
/// bad row cannot sink a whole unit's output.
pub const INSERT_CHUNK_SIZE: usize = 200;

// ──────────────────────────────────────────────
// Jobs
// ──────────────────────────────────────────────

/// Create a new pending job with a generated id and return it.
pub fn create_job(conn: &Connection) -> Result<Job, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    create_job_with_id(conn, &id)
}

/// Create a new pending job under a caller-chosen id.
pub fn create_job_with_id(conn: &Connection, id: &str) -> Result<Job, DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, status, progress, total_units, processed_units,
                           skipped_units, extracted_count, avg_unit_time_ms)
         VALUES (?1, 'pending', 0, 0, 0, 0, 0, 0)",
        params![id],
    )?;
    get_job(conn, id)
}

pub fn get_job(conn: &Connection, id: &str) -> Result<Job, DatabaseError> {
    conn.query_row(
        "SELECT id, status, progress, total_units, processed_units, skipped_units,
                extracted_count, avg_unit_time_ms, started_at, error_message
         FROM jobs WHERE id = ?1",
        params![id],
        row_to_job,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity_type: "job".into(),
            id: id.into(),
        },
        other => other.into(),
    })?
}

/// Apply a partial update; unset fields are left untouched.
pub fn update_job(conn: &Connection, id: &str, patch: &JobPatch) -> Result<(), DatabaseError> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = patch.status {
        sets.push("status = ?".into());
        values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(progress) = patch.progress {
        sets.push("progress = ?".into());
        values.push(Box::new(progress));
    }
    if let Some(total) = patch.total_units {
        sets.push("total_units = ?".into());
        values.push(Box::new(total));
    }
    if let Some(processed) = patch.processed_units {
        sets.push("processed_units = ?".into());
        values.push(Box::new(processed));
    }
    if let Some(skipped) = patch.skipped_units {
        sets.push("skipped_units = ?".into());
        values.push(Box::new(skipped));
    }
    if let Some(extracted) = patch.extracted_count {
        sets.push("extracted_count = ?".into());
        values.push(Box::new(extracted));
    }
    if let Some(avg) = patch.avg_unit_time_ms {
        sets.push("avg_unit_time_ms = ?".into());
        values.push(Box::new(avg as i64));
    }
    if let Some(ref started_at) = patch.started_at {
        sets.push("started_at = ?".into());
        values.push(Box::new(started_at.clone()));
    }
    if let Some(ref message) = patch.error_message {
        sets.push("error_message = ?".into());
        values.push(Box::new(message.clone()));
    }

    if sets.is_empty() {
        return Ok(());
    }

    let sql = format!("UPDATE jobs SET {} WHERE id = ?", sets.join(", "));
    values.push(Box::new(id.to_string()));

    let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "job".into(),
            id: id.into(),
        });
    }
    Ok(())
}

/// Mark jobs left in `processing` by a dead process as failed. Called once
/// at startup, before any new job is admitted.
pub fn fail_interrupted_jobs(conn: &Connection) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'failed', error_message = 'Processing was interrupted'
         WHERE status = 'processing'",
        [],
    )?;
    if changed > 0 {
        warn!(count = changed, "marked interrupted jobs as failed");
    }
    Ok(changed)
}

fn row_to_job(row: &Row) -> rusqlite::Result<Result<Job, DatabaseError>> {
    let status_raw: String = row.get(1)?;
    Ok((|| {
        Ok(Job {
            id: row.get(0)?,
            status: JobStatus::parse(&status_raw)?,
            progress: row.get(2)?,
            total_units: row.get(3)?,
            processed_units: row.get(4)?,
            skipped_units: row.get(5)?,
            extracted_count: row.get(6)?,
            avg_unit_time_ms: row.get::<_, i64>(7)? as u64,
            started_at: row.get(8)?,
            error_message: row.get(9)?,
        })
    })())
}

// ──────────────────────────────────────────────
// Voter records
// ──────────────────────────────────────────────

/// Delete every record belonging to a job. Used on a fresh (non-resumed)
/// restart of a previously attempted job.
pub fn delete_records_for_job(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM voter_records WHERE job_id = ?1",
        params![job_id],
    )?;
    Ok(deleted)
}

/// Insert records in chunked transactions. A failing chunk is logged and
/// skipped rather than aborting the rest. Returns the number inserted.
pub fn insert_records_chunked(
    conn: &Connection,
    records: &[VoterRecord],
) -> Result<usize, DatabaseError> {
    let mut inserted = 0;

    for chunk in records.chunks(INSERT_CHUNK_SIZE) {
        match insert_chunk(conn, chunk) {
            Ok(n) => inserted += n,
            Err(e) => {
                warn!(chunk_len = chunk.len(), error = %e, "record chunk insert failed, skipping");
            }
        }
    }

    Ok(inserted)
}

fn insert_chunk(conn: &Connection, chunk: &[VoterRecord]) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO voter_records (
                id, job_id, serial_number, epic_number, voter_name, voter_name_en,
                relation_type, relation_name, relation_name_en, gender, age,
                house_no, address, booth_number, part_number, ac_no_name,
                section_number, section_name, ps_name, state, gram, thana,
                panchayat, block, tahsil, jilla, status
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
        )?;
        for r in chunk {
            stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                r.job_id,
                r.serial_number,
                r.epic_number,
                r.voter_name,
                r.voter_name_en,
                r.relation_type,
                r.relation_name,
                r.relation_name_en,
                r.gender,
                r.age,
                r.house_no,
                r.address,
                r.booth_number,
                r.part_number,
                r.ac_no_name,
                r.section_number,
                r.section_name,
                r.ps_name,
                r.state,
                r.gram,
                r.thana,
                r.panchayat,
                r.block,
                r.tahsil,
                r.jilla,
                r.status.as_str(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(chunk.len())
}

/// Fetch a page of records for a job, ordered by serial number.
pub fn records_for_job(
    conn: &Connection,
    job_id: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<VoterRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT job_id, serial_number, epic_number, voter_name, voter_name_en,
                relation_type, relation_name, relation_name_en, gender, age,
                house_no, address, booth_number, part_number, ac_no_name,
                section_number, section_name, ps_name, state, gram, thana,
                panchayat, block, tahsil, jilla, status
         FROM voter_records WHERE job_id = ?1
         ORDER BY serial_number, id
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt.query_map(params![job_id, limit, offset], row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row??);
    }
    Ok(records)
}

fn row_to_record(row: &Row) -> rusqlite::Result<Result<VoterRecord, DatabaseError>> {
    let status_raw: String = row.get(25)?;
    Ok((|| {
        Ok(VoterRecord {
            job_id: row.get(0)?,
            serial_number: row.get(1)?,
            epic_number: row.get(2)?,
            voter_name: row.get(3)?,
            voter_name_en: row.get(4)?,
            relation_type: row.get(5)?,
            relation_name: row.get(6)?,
            relation_name_en: row.get(7)?,
            gender: row.get(8)?,
            age: row.get(9)?,
            house_no: row.get(10)?,
            address: row.get(11)?,
            booth_number: row.get(12)?,
            part_number: row.get(13)?,
            ac_no_name: row.get(14)?,
            section_number: row.get(15)?,
            section_name: row.get(16)?,
            ps_name: row.get(17)?,
            state: row.get(18)?,
            gram: row.get(19)?,
            thana: row.get(20)?,
            panchayat: row.get(21)?,
            block: row.get(22)?,
            tahsil: row.get(23)?,
            jilla: row.get(24)?,
            status: RecordStatus::parse(&status_raw)?,
        })
    })())
}

// ──────────────────────────────────────────────
// Statistics
// ──────────────────────────────────────────────

/// Job counts by lifecycle status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: u32,
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

pub fn job_stats(conn: &Connection) -> Result<JobStats, DatabaseError> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'processing'), 0),
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(status = 'failed'), 0)
         FROM jobs",
        [],
        |row| {
            Ok(JobStats {
                total: row.get(0)?,
                pending: row.get(1)?,
                processing: row.get(2)?,
                completed: row.get(3)?,
                failed: row.get(4)?,
            })
        },
    )
    .map_err(Into::into)
}

/// Aggregate data-quality counts for a job's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoterStats {
    pub total: u32,
    pub verified: u32,
    pub flagged: u32,
    pub incomplete: u32,
}

pub fn voter_stats(conn: &Connection, job_id: &str) -> Result<VoterStats, DatabaseError> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'verified'), 0),
                COALESCE(SUM(status = 'flagged'), 0),
                COALESCE(SUM(status = 'incomplete'), 0)
         FROM voter_records WHERE job_id = ?1",
        params![job_id],
        |row| {
            Ok(VoterStats {
                total: row.get(0)?,
                verified: row.get(1)?,
                flagged: row.get(2)?,
                incomplete: row.get(3)?,
            })
        },
    )
    .map_err(Into::into)
}

/// Record counts per reported gender, descending.
pub fn gender_distribution(
    conn: &Connection,
    job_id: &str,
) -> Result<Vec<(String, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT gender, COUNT(*) FROM voter_records
         WHERE job_id = ?1 AND gender <> ''
         GROUP BY gender ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map(params![job_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Record counts per booth, ascending by booth number.
pub fn booth_counts(conn: &Connection, job_id: &str) -> Result<Vec<(String, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT booth_number, COUNT(*) FROM voter_records
         WHERE job_id = ?1 AND booth_number <> ''
         GROUP BY booth_number ORDER BY CAST(booth_number AS INTEGER)",
    )?;
    let rows = stmt.query_map(params![job_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}
