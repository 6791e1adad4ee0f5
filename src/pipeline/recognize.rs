//! Hosted vision-model recognition.
//!
//! Each rendered page image goes to a hosted multimodal model with a fixed
//! extraction prompt and comes back as a raw text payload — ideally JSON,
//! but the caller must be prepared for prose, fenced JSON, or plain label
//! lines. Retry policy lives with the caller; this layer only classifies
//! failures as retryable or not.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::error::RecognitionError;
use crate::config::Config;

/// Prompt sent with every page image. Field labels match the printed roll
/// layout; the model is asked for one JSON object per page.
pub const EXTRACTION_PROMPT: &str = r#"This is a scanned page from an Indian electoral roll (voter list) in Hindi.

Extract the page header fields if present:
- acNoName, partNumber, sectionNumber, sectionName, psName, gram, thana, panchayat, block, tahsil, jilla

Extract EVERY voter entry on the page. Each entry has:
- serial number
- EPIC number (voter ID, e.g. ABC1234567)
- नाम (name)
- पिता/पति/माता का नाम (relation name; relationType is Father, Husband or Mother)
- मकान संख्या (house number)
- आयु (age)
- लिंग: पुरुष = M, महिला = F, अन्य = O

Respond with a single JSON object:
{"header": {"acNoName": "", "partNumber": "", "sectionNumber": "", "sectionName": "", "psName": "", "gram": "", "thana": "", "panchayat": "", "block": "", "tahsil": "", "jilla": ""},
 "voters": [{"serial": 1, "epic": "", "name": "", "relationType": "", "relationName": "", "house": "", "age": 0, "gender": ""}]}

Keep Hindi text in Devanagari as printed. Use empty strings for unreadable fields. Output JSON only, no commentary."#;

/// Visual recognition of one page image into a raw text payload.
pub trait RecognitionClient: Send + Sync {
    fn recognize_page(&self, png_bytes: &[u8]) -> Result<String, RecognitionError>;
}

/// Client for a hosted generative vision API (Gemini-style REST surface).
pub struct HostedVisionClient {
    http: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HostedVisionClient {
    pub fn new(config: &Config) -> Result<Self, RecognitionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RecognitionError::Unreachable(format!("client build failed: {e}")))?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

impl RecognitionClient for HostedVisionClient {
    fn recognize_page(&self, png_bytes: &[u8]) -> Result<String, RecognitionError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [
                    {"text": EXTRACTION_PROMPT},
                    {"inline_data": {
                        "mime_type": "image/png",
                        "data": base64::engine::general_purpose::STANDARD.encode(png_bytes),
                    }},
                ],
            }],
            "generationConfig": {
                "maxOutputTokens": 8192,
                "temperature": 0.1,
            },
        });

        let response = self.http.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                RecognitionError::Transient(format!("request timed out: {e}"))
            } else if e.is_connect() {
                RecognitionError::Unreachable(format!("{e}"))
            } else {
                RecognitionError::Transient(format!("{e}"))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RecognitionError::RateLimited);
        }
        if status.is_server_error() {
            return Err(RecognitionError::Transient(format!("server error {status}")));
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(RecognitionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = response
            .json()
            .map_err(|e| RecognitionError::Payload(format!("response body not JSON: {e}")))?;

        let text = extract_candidate_text(&value)
            .ok_or_else(|| RecognitionError::Payload("no candidate text in response".into()))?;

        debug!(payload_len = text.len(), "received recognition payload");
        Ok(text)
    }
}

/// Concatenated text parts of the first candidate.
fn extract_candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let mut text = String::new();
    for part in parts {
        if let Some(s) = part.get("text").and_then(Value::as_str) {
            text.push_str(s);
        }
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Scripted recognition client. Responses are consumed front-to-back; once
/// the script runs out, `fallback` is returned for every further call.
pub struct MockRecognitionClient {
    script: Mutex<VecDeque<Result<String, RecognitionError>>>,
    fallback: String,
    calls: Mutex<u32>,
}

impl MockRecognitionClient {
    pub fn with_fallback(fallback: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            calls: Mutex::new(0),
        }
    }

    pub fn scripted(responses: Vec<Result<String, RecognitionError>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl RecognitionClient for MockRecognitionClient {
    fn recognize_page(&self, _png_bytes: &[u8]) -> Result<String, RecognitionError> {
        *self.calls.lock().unwrap() += 1;
        match self.script.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_text_concatenates_parts() {
        let value = json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"voters\""}, {"text": ": []}"}]}
            }]
        });
        assert_eq!(
            extract_candidate_text(&value).as_deref(),
            Some("{\"voters\": []}")
        );
    }

    #[test]
    fn missing_candidates_is_none() {
        assert!(extract_candidate_text(&json!({})).is_none());
        assert!(extract_candidate_text(&json!({"candidates": []})).is_none());
    }

    #[test]
    fn mock_plays_script_then_fallback() {
        let mock = MockRecognitionClient::scripted(
            vec![Err(RecognitionError::RateLimited), Ok("first".into())],
            "later",
        );
        assert!(mock.recognize_page(&[]).is_err());
        assert_eq!(mock.recognize_page(&[]).unwrap(), "first");
        assert_eq!(mock.recognize_page(&[]).unwrap(), "later");
        assert_eq!(mock.call_count(), 3);
    }
}
