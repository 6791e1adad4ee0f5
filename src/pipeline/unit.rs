//! Per-document processing.
//!
//! A unit is one scanned roll PDF. Its pages are rendered and recognized
//! through the inner worker pool; page results are merged in page order, so
//! a unit's output is deterministic for a given set of page extractions.
//! Failure to load the document fails the unit; a single bad page only
//! costs that page's entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::archive::booth_number_for;
use super::error::PipelineError;
use super::header::HeaderInfo;
use super::page::extract_page;
use super::pool::run_pool;
use super::rasterize::PageRasterizer;
use super::recognize::RecognitionClient;
use super::types::{PageExtraction, UnitCandidate, UnitResult};
use crate::config::Config;

/// Process one document end to end: render every page, recognize each one
/// concurrently, merge the page extractions in page order.
pub fn process_unit(
    rasterizer: &dyn PageRasterizer,
    client: &dyn RecognitionClient,
    candidate: &UnitCandidate,
    config: &Config,
) -> Result<UnitResult, PipelineError> {
    let unit_name = candidate
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| candidate.path.display().to_string());

    let pdf_bytes = std::fs::read(&candidate.path)?;

    let page_count =
        rasterizer
            .page_count(&pdf_bytes)
            .map_err(|e| PipelineError::Rasterize {
                unit: unit_name.clone(),
                reason: e.to_string(),
            })?;

    debug!(unit = %unit_name, pages = page_count, "processing document");

    // Wall-clock budget for the whole unit, checked between pages.
    let deadline = Instant::now() + Duration::from_secs(config.unit_timeout_secs);
    let timed_out = AtomicBool::new(false);

    let page_indices: Vec<usize> = (0..page_count).collect();
    let extractions = run_pool(&page_indices, config.page_concurrency, |_, &page| {
        if Instant::now() > deadline {
            timed_out.store(true, Ordering::SeqCst);
            return PageExtraction::default();
        }
        match rasterizer.render_page(&pdf_bytes, page, config.dpi) {
            Ok(png) => extract_page(client, &png, config),
            Err(e) => {
                warn!(unit = %unit_name, page, error = %e, "page render failed, skipping page");
                PageExtraction::default()
            }
        }
    });

    if timed_out.load(Ordering::SeqCst) {
        return Err(PipelineError::Rasterize {
            unit: unit_name,
            reason: format!("timed out after {}s", config.unit_timeout_secs),
        });
    }

    let mut header: Option<HeaderInfo> = None;
    let mut voters = Vec::new();
    for extraction in extractions {
        if let Some(page_header) = extraction.header {
            match header.as_mut() {
                Some(h) => h.merge_missing(&page_header),
                None => header = Some(page_header),
            }
        }
        voters.extend(extraction.voters);
    }

    debug!(unit = %unit_name, voters = voters.len(), "document processed");

    Ok(UnitResult {
        voters,
        pages_processed: page_count,
        booth: booth_number_for(&unit_name),
        header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rasterize::{MockRasterizer, MOCK_POISON};
    use crate::pipeline::recognize::MockRecognitionClient;

    fn candidate(dir: &std::path::Path, name: &str, bytes: &[u8]) -> UnitCandidate {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        UnitCandidate {
            path,
            size: bytes.len() as u64,
            order_key: 0,
        }
    }

    fn fast_config() -> Config {
        Config {
            backoff_base_ms: 1,
            ..Config::default()
        }
    }

    #[test]
    fn merges_voters_across_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let cand = candidate(tmp.path(), "HIN-7.pdf", b"%PDF-1.4 fake");
        let rasterizer = MockRasterizer::new(3);
        let client = MockRecognitionClient::with_fallback(
            r#"{"voters": [{"serial": 1, "epic": "ABC1234567", "name": "x", "age": 30, "gender": "M"}]}"#,
        );

        let result = process_unit(&rasterizer, &client, &cand, &fast_config()).unwrap();
        assert_eq!(result.pages_processed, 3);
        assert_eq!(result.voters.len(), 3, "one voter from each of 3 pages");
        assert_eq!(result.booth, "7");
    }

    #[test]
    fn header_first_non_empty_wins_across_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let cand = candidate(tmp.path(), "HIN-1.pdf", b"%PDF-1.4 fake");
        let rasterizer = MockRasterizer::new(2);
        // Page order is preserved by the pool, so page 0's jilla must win.
        // One page worker keeps the scripted responses aligned with pages.
        let client = MockRecognitionClient::scripted(
            vec![
                Ok(r#"{"header": {"jilla": "Varanasi"}, "voters": []}"#.into()),
                Ok(r#"{"header": {"jilla": "Agra", "gram": "Rampur"}, "voters": []}"#.into()),
            ],
            "{}",
        );
        let config = Config {
            page_concurrency: 1,
            ..fast_config()
        };

        let result = process_unit(&rasterizer, &client, &cand, &config).unwrap();
        let header = result.header.unwrap();
        assert_eq!(header.jilla, "Varanasi");
        assert_eq!(header.gram, "Rampur");
    }

    #[test]
    fn unreadable_document_fails_the_unit() {
        let tmp = tempfile::tempdir().unwrap();
        let cand = candidate(tmp.path(), "HIN-2.pdf", MOCK_POISON);
        let rasterizer = MockRasterizer::new(2);
        let client = MockRecognitionClient::with_fallback("{}");

        let err = process_unit(&rasterizer, &client, &cand, &fast_config()).unwrap_err();
        assert!(matches!(err, PipelineError::Rasterize { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let cand = UnitCandidate {
            path: std::path::PathBuf::from("/nonexistent/HIN-1.pdf"),
            size: 1000,
            order_key: 1,
        };
        let rasterizer = MockRasterizer::new(1);
        let client = MockRecognitionClient::with_fallback("{}");

        let err = process_unit(&rasterizer, &client, &cand, &fast_config()).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn exhausted_time_budget_fails_the_unit() {
        let tmp = tempfile::tempdir().unwrap();
        let cand = candidate(tmp.path(), "HIN-3.pdf", b"%PDF-1.4 fake");
        let rasterizer = MockRasterizer::new(4);
        let client = MockRecognitionClient::with_fallback("{}");
        let config = Config {
            unit_timeout_secs: 0,
            ..fast_config()
        };

        let err = process_unit(&rasterizer, &client, &cand, &config).unwrap_err();
        match err {
            PipelineError::Rasterize { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn empty_document_yields_no_voters() {
        let tmp = tempfile::tempdir().unwrap();
        let cand = candidate(tmp.path(), "scan.pdf", b"%PDF-1.4 fake");
        let rasterizer = MockRasterizer::new(0);
        let client = MockRecognitionClient::with_fallback("{}");

        let result = process_unit(&rasterizer, &client, &cand, &fast_config()).unwrap();
        assert!(result.voters.is_empty());
        assert_eq!(result.pages_processed, 0);
        assert_eq!(result.booth, "");
    }
}
