//! Batch orchestration.
//!
//! Drives a job from archive to database: extract, discover, filter, order,
//! resume if applicable, then fan documents out over the outer worker pool.
//! Unit failures are contained — the batch completes with a summary message
//! rather than failing outright. All persistent job state lives in the jobs
//! row, so a crashed or cancelled run can be resumed by count.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rusqlite::Connection;
use tracing::{info, warn};

use super::archive::{discover_units, extract_archive, sort_units, MIN_UNIT_SIZE};
use super::error::PipelineError;
use super::guard::JobGuard;
use super::header::HeaderInfo;
use super::rasterize::PageRasterizer;
use super::recognize::RecognitionClient;
use super::types::{JobPatch, JobStatus, UnitCandidate, VoterRecord};
use super::unit::process_unit;
use crate::config::Config;
use crate::db;
use crate::pipeline::pool::run_pool;

/// Default state stamped on records when no page header supplies one.
const DEFAULT_STATE: &str = "Uttar Pradesh";

/// Outcome of one unit inside the outer pool.
enum UnitOutcome {
    Done,
    Failed,
    Cancelled,
}

/// Orchestrates batch jobs over shared rasterizer and recognition clients.
pub struct BatchScheduler {
    rasterizer: Arc<dyn PageRasterizer>,
    client: Arc<dyn RecognitionClient>,
    guard: JobGuard,
    config: Config,
}

impl BatchScheduler {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        client: Arc<dyn RecognitionClient>,
        guard: JobGuard,
        config: Config,
    ) -> Self {
        Self {
            rasterizer,
            client,
            guard,
            config,
        }
    }

    pub fn guard(&self) -> &JobGuard {
        &self.guard
    }

    /// Process an archive of documents for `job_id`.
    ///
    /// Domain-level failures (bad archive, nothing to process) land on the
    /// job row as `failed` with a message; only infrastructure errors
    /// propagate as `Err`.
    pub fn run_batch(
        &self,
        conn: &Mutex<Connection>,
        job_id: &str,
        archive_path: &Path,
    ) -> Result<(), PipelineError> {
        let lease = match self.guard.admit(job_id) {
            Some(lease) => lease,
            None => {
                warn!(job_id, "job already active, ignoring duplicate start");
                return Ok(());
            }
        };
        let _lease = lease;

        let scratch = tempfile::tempdir()?;
        let extract_timeout = std::time::Duration::from_secs(self.config.extract_timeout_secs);
        if let Err(e) = extract_archive(archive_path, scratch.path(), extract_timeout) {
            warn!(job_id, error = %e, "archive extraction failed");
            self.fail_job(conn, job_id, &format!("Archive extraction failed: {e}"))?;
            return Ok(());
        }

        let discovered = discover_units(scratch.path())?;
        self.run_units(conn, job_id, discovered)
    }

    /// Process a single already-extracted document as a one-unit batch.
    pub fn run_single(
        &self,
        conn: &Mutex<Connection>,
        job_id: &str,
        pdf_path: &Path,
    ) -> Result<(), PipelineError> {
        let lease = match self.guard.admit(job_id) {
            Some(lease) => lease,
            None => {
                warn!(job_id, "job already active, ignoring duplicate start");
                return Ok(());
            }
        };
        let _lease = lease;

        let name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(pdf_path)?.len();
        let candidate = UnitCandidate {
            path: pdf_path.to_path_buf(),
            size,
            order_key: super::archive::order_key_for(&name),
        };
        self.run_units(conn, job_id, vec![candidate])
    }

    fn run_units(
        &self,
        conn: &Mutex<Connection>,
        job_id: &str,
        discovered: Vec<UnitCandidate>,
    ) -> Result<(), PipelineError> {
        let total_discovered = discovered.len() as u32;
        let (mut eligible, skipped): (Vec<_>, Vec<_>) = discovered
            .into_iter()
            .partition(|u| u.size >= MIN_UNIT_SIZE);
        let skipped_count = skipped.len() as u32;
        for unit in &skipped {
            info!(job_id, path = %unit.path.display(), size = unit.size, "skipping undersized document");
        }

        if eligible.is_empty() {
            self.fail_job(conn, job_id, "No valid PDF documents found in archive")?;
            return Ok(());
        }

        sort_units(&mut eligible);
        let eligible_total = eligible.len() as u32;

        // Resume by count: a partially processed job keeps its counters and
        // records, and skips the first `processed_units` of the sorted order.
        let job = {
            let conn = conn.lock().unwrap();
            db::get_job(&conn, job_id)?
        };
        let (resume_from, initial_extracted) =
            if job.processed_units > 0 && job.processed_units < eligible_total {
                info!(
                    job_id,
                    processed = job.processed_units,
                    total = eligible_total,
                    "resuming partially processed job"
                );
                (job.processed_units, job.extracted_count)
            } else {
                let conn = conn.lock().unwrap();
                db::delete_records_for_job(&conn, job_id)?;
                (0, 0)
            };

        {
            let conn = conn.lock().unwrap();
            db::update_job(
                &conn,
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Processing),
                    progress: Some((resume_from * 100 / eligible_total).min(99)),
                    total_units: Some(total_discovered),
                    processed_units: Some(resume_from),
                    skipped_units: Some(skipped_count),
                    extracted_count: Some(initial_extracted),
                    // A resumed job keeps its original start timestamp.
                    started_at: if resume_from == 0 {
                        Some(chrono::Utc::now().to_rfc3339())
                    } else {
                        None
                    },
                    error_message: Some(None),
                    ..Default::default()
                },
            )?;
        }

        let processed = AtomicU32::new(resume_from);
        let extracted = AtomicU32::new(initial_extracted);
        let session_processed = AtomicU32::new(0);
        let session_start = Instant::now();
        let failures: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let job_header = Mutex::new(HeaderInfo {
            state: DEFAULT_STATE.to_string(),
            ..Default::default()
        });

        let remaining = &eligible[resume_from as usize..];
        let outcomes = run_pool(remaining, self.config.doc_concurrency, |_, candidate| {
            if !self.guard.is_active(job_id) {
                return UnitOutcome::Cancelled;
            }

            let unit_name = candidate
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let outcome = match process_unit(
                self.rasterizer.as_ref(),
                self.client.as_ref(),
                candidate,
                &self.config,
            ) {
                Ok(result) => {
                    let header_snapshot = {
                        let mut header = job_header.lock().unwrap();
                        if let Some(ref unit_header) = result.header {
                            header.merge_missing(unit_header);
                        }
                        header.clone()
                    };
                    let booth = if result.booth.is_empty() {
                        header_snapshot.part_number.clone()
                    } else {
                        result.booth.clone()
                    };

                    let records: Vec<VoterRecord> = result
                        .voters
                        .iter()
                        .map(|raw| VoterRecord::from_raw(raw, job_id, &booth, &header_snapshot))
                        .collect();

                    let inserted = {
                        let conn = conn.lock().unwrap();
                        db::insert_records_chunked(&conn, &records).unwrap_or_else(|e| {
                            warn!(job_id, unit = %unit_name, error = %e, "record insert failed");
                            0
                        })
                    };
                    // The counter tracks what was extracted, not what was
                    // persisted; a failed chunk is logged and skipped.
                    extracted.fetch_add(records.len() as u32, Ordering::SeqCst);
                    info!(job_id, unit = %unit_name, records = records.len(), inserted, "document done");
                    UnitOutcome::Done
                }
                Err(e) => {
                    warn!(job_id, unit = %unit_name, error = %e, "document failed");
                    failures.lock().unwrap().push(unit_name);
                    UnitOutcome::Failed
                }
            };

            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            let session_done = session_processed.fetch_add(1, Ordering::SeqCst) + 1;
            let avg_ms = session_start.elapsed().as_millis() as u64 / session_done as u64;

            let patch = JobPatch {
                progress: Some((done * 100 / eligible_total).min(99)),
                processed_units: Some(done),
                extracted_count: Some(extracted.load(Ordering::SeqCst)),
                avg_unit_time_ms: Some(avg_ms),
                ..Default::default()
            };
            {
                let conn = conn.lock().unwrap();
                if let Err(e) = db::update_job(&conn, job_id, &patch) {
                    warn!(job_id, error = %e, "progress update failed");
                }
            }

            outcome
        });

        let cancelled = outcomes.iter().any(|o| matches!(o, UnitOutcome::Cancelled));
        if cancelled {
            info!(job_id, "job cancelled, counters kept for resume");
            self.fail_job(conn, job_id, "Processing cancelled")?;
            return Ok(());
        }

        let failed_count = failures.lock().unwrap().len() as u32;
        let processed_total = processed.load(Ordering::SeqCst);
        let succeeded = processed_total - failed_count;
        let message = if failed_count > 0 || skipped_count > 0 {
            Some(format!(
                "Processed {succeeded}/{eligible_total} PDFs. {failed_count} failed. {skipped_count} empty files skipped."
            ))
        } else {
            None
        };

        {
            let conn = conn.lock().unwrap();
            db::update_job(
                &conn,
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    error_message: Some(message),
                    ..Default::default()
                },
            )?;
        }
        info!(
            job_id,
            processed = processed_total,
            extracted = extracted.load(Ordering::SeqCst),
            failed = failed_count,
            "batch completed"
        );
        Ok(())
    }

    fn fail_job(
        &self,
        conn: &Mutex<Connection>,
        job_id: &str,
        message: &str,
    ) -> Result<(), PipelineError> {
        let conn = conn.lock().unwrap();
        db::update_job(
            &conn,
            job_id,
            &JobPatch {
                status: Some(JobStatus::Failed),
                error_message: Some(Some(message.to_string())),
                ..Default::default()
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::rasterize::{MockRasterizer, MOCK_POISON};
    use crate::pipeline::recognize::MockRecognitionClient;
    use std::fs::File;
    use std::io::Write;

    const PAYLOAD: &str = r#"{"header": {"jilla": "वाराणसी", "partNumber": "55"}, "voters": [
        {"serial": 1, "epic": "ABC1234567", "name": "राम", "age": 30, "gender": "M"},
        {"serial": 2, "epic": "XYZ7654321", "name": "सीता", "age": 28, "gender": "F"}
    ]}"#;

    fn build_archive(dir: &Path, files: &[(&str, &[u8])]) -> std::path::PathBuf {
        let src = dir.join("src");
        std::fs::create_dir_all(&src).unwrap();
        for (name, bytes) in files {
            let mut f = File::create(src.join(name)).unwrap();
            f.write_all(bytes).unwrap();
        }
        let archive_path = dir.join("batch.tar.gz");
        let gz = flate2::write::GzEncoder::new(
            File::create(&archive_path).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);
        builder.append_dir_all(".", &src).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        archive_path
    }

    fn scheduler(pages: usize, client: Arc<MockRecognitionClient>) -> BatchScheduler {
        BatchScheduler::new(
            Arc::new(MockRasterizer::new(pages)),
            client,
            JobGuard::new(),
            Config {
                backoff_base_ms: 1,
                ..Config::default()
            },
        )
    }

    fn healthy_pdf() -> Vec<u8> {
        let mut bytes = b"%PDF-1.4 ".to_vec();
        bytes.resize(600, b'x');
        bytes
    }

    #[test]
    fn batch_completes_and_persists_records() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let archive = build_archive(
            tmp.path(),
            &[
                ("HIN-2.pdf", pdf.as_slice()),
                ("HIN-1.pdf", pdf.as_slice()),
                ("HIN-3.pdf", pdf.as_slice()),
            ],
        );

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(2, client);
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let guard = conn.lock().unwrap();
        let job = db::get_job(&guard, "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.total_units, 3);
        assert_eq!(job.processed_units, 3);
        assert_eq!(job.skipped_units, 0);
        // 3 documents x 2 pages x 2 voters
        assert_eq!(job.extracted_count, 12);
        assert!(job.error_message.is_none());
        assert!(job.started_at.is_some());

        let records = db::records_for_job(&guard, "job-1", 100, 0).unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[0].state, "Uttar Pradesh");
        assert!(!records[0].jilla.is_empty(), "header fields flow into records");
    }

    #[test]
    fn poison_unit_does_not_sink_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let mut files: Vec<(String, Vec<u8>)> = (1..=9)
            .map(|i| (format!("HIN-{i}.pdf"), pdf.clone()))
            .collect();
        let mut poison = MOCK_POISON.to_vec();
        poison.resize(600, b'x');
        files.push(("HIN-10.pdf".to_string(), poison));
        let file_refs: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        let archive = build_archive(tmp.path(), &file_refs);

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client);
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let guard = conn.lock().unwrap();
        let job = db::get_job(&guard, "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_units, 10, "failed unit still counts as processed");
        assert_eq!(job.extracted_count, 18, "9 healthy documents x 2 voters");
        let message = job.error_message.unwrap();
        assert!(message.contains("9/10"), "summary: {message}");
        assert!(message.contains("1 failed"), "summary: {message}");
    }

    #[test]
    fn failed_record_insert_keeps_extracted_count() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let archive = build_archive(tmp.path(), &[("HIN-1.pdf", pdf.as_slice())]);

        let conn = Mutex::new(open_memory_database().unwrap());
        {
            let guard = conn.lock().unwrap();
            db::create_job_with_id(&guard, "job-1").unwrap();
            // Break record inserts only; deletes and job updates still work.
            guard
                .execute_batch(
                    "CREATE TRIGGER reject_records BEFORE INSERT ON voter_records
                     BEGIN SELECT RAISE(ABORT, 'insert disabled'); END",
                )
                .unwrap();
        }

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client);
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let guard = conn.lock().unwrap();
        let job = db::get_job(&guard, "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.extracted_count, 2, "counter reflects extraction, not persistence");
        assert!(db::records_for_job(&guard, "job-1", 10, 0).unwrap().is_empty());
    }

    #[test]
    fn undersized_documents_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let tiny = vec![b'x'; 100];
        let archive = build_archive(
            tmp.path(),
            &[("HIN-1.pdf", pdf.as_slice()), ("HIN-2.pdf", tiny.as_slice())],
        );

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client.clone());
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let guard = conn.lock().unwrap();
        let job = db::get_job(&guard, "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_units, 2);
        assert_eq!(job.skipped_units, 1);
        assert_eq!(job.processed_units, 1);
        assert!(job.error_message.unwrap().contains("1 empty files skipped"));
        assert_eq!(client.call_count(), 1, "skipped unit never reaches recognition");
    }

    #[test]
    fn archive_without_documents_fails_the_job() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_archive(tmp.path(), &[("notes.txt", b"hello" as &[u8])]);

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client);
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let job = db::get_job(&conn.lock().unwrap(), "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("No valid PDF documents found in archive")
        );
    }

    #[test]
    fn corrupt_archive_fails_the_job() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bad.tar.gz");
        std::fs::write(&archive, b"garbage").unwrap();

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client);
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let job = db::get_job(&conn.lock().unwrap(), "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().starts_with("Archive extraction failed"));
    }

    #[test]
    fn partially_processed_job_resumes_by_count() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let archive = build_archive(
            tmp.path(),
            &[
                ("HIN-1.pdf", pdf.as_slice()),
                ("HIN-2.pdf", pdf.as_slice()),
                ("HIN-3.pdf", pdf.as_slice()),
                ("HIN-4.pdf", pdf.as_slice()),
            ],
        );

        let conn = Mutex::new(open_memory_database().unwrap());
        {
            let guard = conn.lock().unwrap();
            db::create_job_with_id(&guard, "job-1").unwrap();
            // Simulate an earlier run that got through 2 of 4 documents.
            db::update_job(
                &guard,
                "job-1",
                &JobPatch {
                    status: Some(JobStatus::Failed),
                    processed_units: Some(2),
                    extracted_count: Some(4),
                    started_at: Some("2026-08-01T09:00:00+00:00".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client.clone());
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let guard = conn.lock().unwrap();
        let job = db::get_job(&guard, "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_units, 4);
        assert_eq!(job.extracted_count, 8, "4 carried over + 2 units x 2 voters");
        assert_eq!(client.call_count(), 2, "only the remaining 2 documents are recognized");
        assert_eq!(
            job.started_at.as_deref(),
            Some("2026-08-01T09:00:00+00:00"),
            "resume keeps the original start timestamp"
        );
    }

    #[test]
    fn fully_processed_job_restarts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let archive = build_archive(tmp.path(), &[("HIN-1.pdf", pdf.as_slice())]);

        let conn = Mutex::new(open_memory_database().unwrap());
        {
            let guard = conn.lock().unwrap();
            db::create_job_with_id(&guard, "job-1").unwrap();
            db::update_job(
                &guard,
                "job-1",
                &JobPatch {
                    processed_units: Some(1),
                    extracted_count: Some(99),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client);
        sched.run_batch(&conn, "job-1", &archive).unwrap();

        let job = db::get_job(&conn.lock().unwrap(), "job-1").unwrap();
        assert_eq!(job.extracted_count, 2, "stale counters reset on fresh start");
    }

    #[test]
    fn duplicate_start_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = healthy_pdf();
        let archive = build_archive(tmp.path(), &[("HIN-1.pdf", pdf.as_slice())]);

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(1, client);
        let _lease = sched.guard().admit("job-1").unwrap();

        sched.run_batch(&conn, "job-1", &archive).unwrap();
        let job = db::get_job(&conn.lock().unwrap(), "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Pending, "duplicate start must not touch the job");
    }

    #[test]
    fn single_document_job() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf_path = tmp.path().join("HIN-9.pdf");
        std::fs::write(&pdf_path, healthy_pdf()).unwrap();

        let conn = Mutex::new(open_memory_database().unwrap());
        db::create_job_with_id(&conn.lock().unwrap(), "job-1").unwrap();

        let client = Arc::new(MockRecognitionClient::with_fallback(PAYLOAD));
        let sched = scheduler(2, client);
        sched.run_single(&conn, "job-1", &pdf_path).unwrap();

        let guard = conn.lock().unwrap();
        let job = db::get_job(&guard, "job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.extracted_count, 4);
        let records = db::records_for_job(&guard, "job-1", 10, 0).unwrap();
        assert!(records.iter().all(|r| r.booth_number == "9"));
    }
}
