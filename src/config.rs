//! Runtime configuration.
//!
//! Everything has a sensible default; deployment-specific values come from
//! environment variables so the same binary runs unchanged across machines.

use std::env;

/// Pipeline configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the hosted recognition service.
    pub api_key: String,
    /// Base URL of the recognition API.
    pub api_base: String,
    /// Model identifier passed to the recognition API.
    pub model: String,
    /// Rasterization resolution.
    pub dpi: u32,
    /// How many documents are processed concurrently within a batch.
    pub doc_concurrency: usize,
    /// How many pages are processed concurrently within a document.
    pub page_concurrency: usize,
    /// Total attempts per page request, including the first.
    pub max_attempts: u32,
    /// Base delay for retry backoff.
    pub backoff_base_ms: u64,
    /// Per-request timeout for the recognition API.
    pub request_timeout_secs: u64,
    /// Wall-clock budget for rasterizing and recognizing one document.
    pub unit_timeout_secs: u64,
    /// Wall-clock budget for unpacking a job archive.
    pub extract_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            dpi: 150,
            doc_concurrency: 2,
            page_concurrency: 4,
            max_attempts: 3,
            backoff_base_ms: 1000,
            request_timeout_secs: 120,
            unit_timeout_secs: 600,
            extract_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            api_key: env::var("ROLLSCAN_API_KEY").unwrap_or(defaults.api_key),
            api_base: env::var("ROLLSCAN_API_BASE").unwrap_or(defaults.api_base),
            model: env::var("ROLLSCAN_MODEL").unwrap_or(defaults.model),
            dpi: env_parse("ROLLSCAN_DPI", defaults.dpi),
            doc_concurrency: env_parse("ROLLSCAN_DOC_CONCURRENCY", defaults.doc_concurrency),
            page_concurrency: env_parse("ROLLSCAN_PAGE_CONCURRENCY", defaults.page_concurrency),
            max_attempts: env_parse("ROLLSCAN_MAX_ATTEMPTS", defaults.max_attempts),
            backoff_base_ms: env_parse("ROLLSCAN_BACKOFF_BASE_MS", defaults.backoff_base_ms),
            request_timeout_secs: env_parse(
                "ROLLSCAN_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            unit_timeout_secs: env_parse("ROLLSCAN_UNIT_TIMEOUT_SECS", defaults.unit_timeout_secs),
            extract_timeout_secs: env_parse(
                "ROLLSCAN_EXTRACT_TIMEOUT_SECS",
                defaults.extract_timeout_secs,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
