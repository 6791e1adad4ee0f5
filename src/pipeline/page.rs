//! Per-page extraction: recognition with retry, then payload parsing.
//!
//! A page that keeps failing is worth far less than the rest of its batch,
//! so exhausted retries degrade to an empty extraction instead of failing
//! the document.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::error::RecognitionError;
use super::parser;
use super::recognize::RecognitionClient;
use super::types::PageExtraction;
use crate::config::Config;

/// Upper bound on the random jitter added to rate-limit backoff.
const JITTER_MS: u64 = 1000;

/// Recognize and parse one page image. Never fails: retryable errors are
/// retried with backoff, anything else yields an empty extraction.
pub fn extract_page(
    client: &dyn RecognitionClient,
    png_bytes: &[u8],
    config: &Config,
) -> PageExtraction {
    let attempts = config.max_attempts.max(1);

    for attempt in 0..attempts {
        match client.recognize_page(png_bytes) {
            Ok(payload) => return parser::parse_payload(&payload),
            Err(e) => {
                let last = attempt + 1 >= attempts;
                if !e.is_retryable() || last {
                    warn!(attempt = attempt + 1, error = %e, "page recognition abandoned");
                    return PageExtraction::default();
                }
                let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
                let delay = backoff_delay(&e, attempt, config.backoff_base_ms, jitter);
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "page recognition failed, retrying");
                std::thread::sleep(delay);
            }
        }
    }

    PageExtraction::default()
}

/// Delay before retry `attempt + 1`. Rate limits back off exponentially
/// with jitter; other transient failures wait a fixed multiple of the base.
fn backoff_delay(error: &RecognitionError, attempt: u32, base_ms: u64, jitter_ms: u64) -> Duration {
    let ms = if error.is_rate_limit() {
        2u64.saturating_pow(attempt + 1).saturating_mul(base_ms) + jitter_ms
    } else {
        2 * base_ms
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::recognize::MockRecognitionClient;

    fn fast_config() -> Config {
        Config {
            backoff_base_ms: 1,
            ..Config::default()
        }
    }

    const GOOD_PAYLOAD: &str =
        r#"{"voters": [{"serial": 1, "epic": "ABC1234567", "name": "राम", "age": 30, "gender": "M"}]}"#;

    #[test]
    fn success_on_first_attempt() {
        let client = MockRecognitionClient::with_fallback(GOOD_PAYLOAD);
        let page = extract_page(&client, &[], &fast_config());
        assert_eq!(page.voters.len(), 1);
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn transient_failures_retried_until_success() {
        let client = MockRecognitionClient::scripted(
            vec![
                Err(RecognitionError::RateLimited),
                Err(RecognitionError::Transient("503".into())),
            ],
            GOOD_PAYLOAD,
        );
        let page = extract_page(&client, &[], &fast_config());
        assert_eq!(page.voters.len(), 1);
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn exhausted_retries_degrade_to_empty() {
        let client = MockRecognitionClient::scripted(
            vec![
                Err(RecognitionError::RateLimited),
                Err(RecognitionError::RateLimited),
                Err(RecognitionError::RateLimited),
            ],
            GOOD_PAYLOAD,
        );
        let page = extract_page(&client, &[], &fast_config());
        assert!(page.voters.is_empty());
        assert_eq!(client.call_count(), 3, "default policy is 3 attempts");
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let client = MockRecognitionClient::scripted(
            vec![Err(RecognitionError::Api {
                status: 400,
                message: "bad image".into(),
            })],
            GOOD_PAYLOAD,
        );
        let page = extract_page(&client, &[], &fast_config());
        assert!(page.voters.is_empty());
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn rate_limit_backoff_grows_exponentially() {
        let e = RecognitionError::RateLimited;
        assert_eq!(backoff_delay(&e, 0, 1000, 0), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&e, 1, 1000, 0), Duration::from_millis(4000));
        assert_eq!(backoff_delay(&e, 2, 1000, 500), Duration::from_millis(8500));
    }

    #[test]
    fn other_transient_backoff_is_fixed() {
        let e = RecognitionError::Transient("io".into());
        assert_eq!(backoff_delay(&e, 0, 1000, 0), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&e, 2, 1000, 999), Duration::from_millis(2000));
    }
}
