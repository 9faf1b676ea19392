use anyhow::{Context, Result};
use redevelop_contracts::requests::{AttemptOutcome, AttemptRecord, GeneratedImage};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::error_chain_text;

pub const OVERLOADED_MESSAGE: &str = "All models are overloaded. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Transport for the image-generation GET endpoint. `Err` means the request
/// never produced a complete HTTP response.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, url: &str) -> Result<BackendResponse>;
}

pub struct HttpImageBackend {
    http: HttpClient,
}

impl HttpImageBackend {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl ImageBackend for HttpImageBackend {
    fn name(&self) -> &str {
        "pollinations"
    }

    fn fetch(&self, url: &str) -> Result<BackendResponse> {
        let response = self
            .http
            .get(url)
            .send()
            .context("image generation request failed")?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .context("image generation response body read failed")?
            .to_vec();
        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Everything in the generation URL except the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationQuery {
    pub base: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: i64,
    pub api_key: String,
    pub reference_url: Option<String>,
}

impl GenerationQuery {
    pub fn url_for(&self, model: &str) -> String {
        let mut url = format!(
            "{}/image/{}?width={}&height={}&nologo=true&seed={}&model={}&key={}",
            self.base.trim_end_matches('/'),
            urlencoding::encode(&self.prompt),
            self.width,
            self.height,
            self.seed,
            urlencoding::encode(model),
            urlencoding::encode(&self.api_key),
        );
        if let Some(reference_url) = self
            .reference_url
            .as_deref()
            .filter(|value| !value.is_empty())
        {
            url.push_str("&image=");
            url.push_str(&urlencoding::encode(reference_url));
        }
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSuccess {
    pub model: String,
    pub image: GeneratedImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    pub attempts: Vec<AttemptRecord>,
    pub result: std::result::Result<ChainSuccess, String>,
}

pub fn classify_status(status: u16) -> AttemptOutcome {
    if (200..300).contains(&status) {
        AttemptOutcome::Success
    } else if status == 429 || status >= 500 {
        AttemptOutcome::Retryable
    } else {
        AttemptOutcome::Fatal
    }
}

/// Human-readable message from a failed response body: the first non-empty of
/// `error.message` and `message`, else the raw text. `None` for an empty body.
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(payload) = serde_json::from_str::<Value>(trimmed) {
        let structured = non_empty_str(payload.get("error").and_then(|error| error.get("message")))
            .or_else(|| non_empty_str(payload.get("message")));
        if let Some(message) = structured {
            return Some(message.to_string());
        }
    }
    Some(trimmed.to_string())
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
}

/// Tries each model in order until one succeeds, a non-retryable failure
/// occurs, or the list is exhausted. Attempts run strictly one after another.
pub fn run_fallback_chain<F>(
    backend: &dyn ImageBackend,
    query: &GenerationQuery,
    models: &[String],
    mut on_attempt: F,
) -> Result<ChainOutcome>
where
    F: FnMut(usize, &AttemptRecord) -> Result<()>,
{
    let mut attempts = Vec::new();
    let mut last_error: Option<String> = None;

    for (index, model) in models.iter().enumerate() {
        let url = query.url_for(model);
        let response = match backend.fetch(&url) {
            Ok(response) => response,
            Err(err) => {
                let message = error_chain_text(&err, 1024);
                let record = AttemptRecord {
                    model: model.clone(),
                    status_code: None,
                    outcome: AttemptOutcome::Fatal,
                    message: Some(message.clone()),
                };
                on_attempt(index, &record)?;
                attempts.push(record);
                return Ok(ChainOutcome {
                    attempts,
                    result: Err(message),
                });
            }
        };

        let outcome = classify_status(response.status);
        if outcome == AttemptOutcome::Success {
            let record = AttemptRecord {
                model: model.clone(),
                status_code: Some(response.status),
                outcome,
                message: None,
            };
            on_attempt(index, &record)?;
            attempts.push(record);
            return Ok(ChainOutcome {
                attempts,
                result: Ok(ChainSuccess {
                    model: model.clone(),
                    image: GeneratedImage {
                        bytes: response.body,
                        content_type: response.content_type,
                    },
                }),
            });
        }

        let message = extract_error_message(&response.body);
        let record = AttemptRecord {
            model: model.clone(),
            status_code: Some(response.status),
            outcome,
            message: message.clone(),
        };
        on_attempt(index, &record)?;
        attempts.push(record);
        last_error = message;

        if outcome == AttemptOutcome::Fatal {
            let surfaced = last_error
                .unwrap_or_else(|| format!("Request failed with status {}", response.status));
            return Ok(ChainOutcome {
                attempts,
                result: Err(surfaced),
            });
        }
    }

    Ok(ChainOutcome {
        attempts,
        result: Err(last_error.unwrap_or_else(|| OVERLOADED_MESSAGE.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use redevelop_contracts::requests::AttemptOutcome;

    use super::{
        classify_status, extract_error_message, run_fallback_chain, BackendResponse,
        GenerationQuery, ImageBackend, OVERLOADED_MESSAGE,
    };

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<BackendResponse>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<BackendResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ImageBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(&self, url: &str) -> Result<BackendResponse> {
            self.seen.lock().unwrap().push(url.to_string());
            match self.script.lock().unwrap().pop_front() {
                Some(next) => next,
                None => bail!("script exhausted"),
            }
        }
    }

    fn status(code: u16, body: &str) -> Result<BackendResponse> {
        Ok(BackendResponse {
            status: code,
            content_type: Some("application/json".to_string()),
            body: body.as_bytes().to_vec(),
        })
    }

    fn image(bytes: &[u8]) -> Result<BackendResponse> {
        Ok(BackendResponse {
            status: 200,
            content_type: Some("image/jpeg".to_string()),
            body: bytes.to_vec(),
        })
    }

    fn models() -> Vec<String> {
        vec![
            "nanobanana-pro".to_string(),
            "nanobanana".to_string(),
            "gptimage".to_string(),
        ]
    }

    fn query() -> GenerationQuery {
        GenerationQuery {
            base: "https://gen.example".to_string(),
            prompt: "a warehouse".to_string(),
            width: 1024,
            height: 768,
            seed: 17,
            api_key: "sk_test".to_string(),
            reference_url: None,
        }
    }

    fn model_of(url: &str) -> String {
        url.split('&')
            .find_map(|pair| pair.strip_prefix("model="))
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn retryable_failures_fall_through_to_last_model() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            status(429, ""),
            status(500, ""),
            image(b"third"),
        ]);
        let mut observed = Vec::new();
        let outcome = run_fallback_chain(&backend, &query(), &models(), |index, record| {
            observed.push((index, record.outcome));
            Ok(())
        })?;

        let tried: Vec<String> = backend.seen().iter().map(|url| model_of(url)).collect();
        assert_eq!(tried, models());
        let success = outcome.result.expect("chain should succeed");
        assert_eq!(success.model, "gptimage");
        assert_eq!(success.image.bytes, b"third".to_vec());
        assert_eq!(
            observed,
            vec![
                (0, AttemptOutcome::Retryable),
                (1, AttemptOutcome::Retryable),
                (2, AttemptOutcome::Success)
            ]
        );
        Ok(())
    }

    #[test]
    fn non_retryable_failure_stops_after_first_attempt() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            status(400, r#"{"error":{"message":"Invalid prompt"}}"#),
            image(b"never"),
        ]);
        let outcome = run_fallback_chain(&backend, &query(), &models(), |_, _| Ok(()))?;

        assert_eq!(backend.seen().len(), 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Fatal);
        assert_eq!(outcome.result, Err("Invalid prompt".to_string()));
        Ok(())
    }

    #[test]
    fn fatal_failure_without_body_reports_status() -> Result<()> {
        let backend = ScriptedBackend::new(vec![status(401, "")]);
        let outcome = run_fallback_chain(&backend, &query(), &models(), |_, _| Ok(()))?;
        assert_eq!(
            outcome.result,
            Err("Request failed with status 401".to_string())
        );
        Ok(())
    }

    #[test]
    fn exhausted_chain_reports_overload() -> Result<()> {
        let backend =
            ScriptedBackend::new(vec![status(429, ""), status(429, ""), status(429, "")]);
        let outcome = run_fallback_chain(&backend, &query(), &models(), |_, _| Ok(()))?;
        assert_eq!(backend.seen().len(), 3);
        assert_eq!(outcome.result, Err(OVERLOADED_MESSAGE.to_string()));
        Ok(())
    }

    #[test]
    fn exhausted_chain_prefers_last_specific_message() -> Result<()> {
        let backend = ScriptedBackend::new(vec![
            status(429, "queue full"),
            status(503, ""),
            status(502, r#"{"message":"upstream unavailable"}"#),
        ]);
        let outcome = run_fallback_chain(&backend, &query(), &models(), |_, _| Ok(()))?;
        assert_eq!(outcome.result, Err("upstream unavailable".to_string()));
        Ok(())
    }

    #[test]
    fn transport_error_is_terminal() -> Result<()> {
        let backend = ScriptedBackend::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let outcome = run_fallback_chain(&backend, &query(), &models(), |_, _| Ok(()))?;
        assert_eq!(backend.seen().len(), 1);
        assert_eq!(outcome.attempts[0].status_code, None);
        assert_eq!(outcome.result, Err("connection refused".to_string()));
        Ok(())
    }

    #[test]
    fn observer_error_aborts_chain() {
        let backend = ScriptedBackend::new(vec![status(429, ""), image(b"x")]);
        let result = run_fallback_chain(&backend, &query(), &models(), |_, _| {
            bail!("event log unavailable")
        });
        assert!(result.is_err());
        assert_eq!(backend.seen().len(), 1);
    }

    #[test]
    fn url_encodes_prompt_and_appends_reference_last() {
        let mut query = query();
        query.prompt = "loods: staal & glas".to_string();
        query.reference_url = Some("https://tmpfiles.org/dl/1/a b.jpg".to_string());
        let url = query.url_for("nanobanana");
        assert_eq!(
            url,
            "https://gen.example/image/loods%3A%20staal%20%26%20glas?width=1024&height=768&nologo=true&seed=17&model=nanobanana&key=sk_test&image=https%3A%2F%2Ftmpfiles.org%2Fdl%2F1%2Fa%20b.jpg"
        );
    }

    #[test]
    fn url_omits_image_without_reference() {
        let url = query().url_for("gptimage");
        assert!(!url.contains("image="));
        assert!(url.contains("&model=gptimage&"));
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(200), AttemptOutcome::Success);
        assert_eq!(classify_status(429), AttemptOutcome::Retryable);
        assert_eq!(classify_status(500), AttemptOutcome::Retryable);
        assert_eq!(classify_status(503), AttemptOutcome::Retryable);
        assert_eq!(classify_status(400), AttemptOutcome::Fatal);
        assert_eq!(classify_status(404), AttemptOutcome::Fatal);
    }

    #[test]
    fn error_message_extraction_order() {
        assert_eq!(
            extract_error_message(br#"{"error":{"message":"nested"},"message":"flat"}"#),
            Some("nested".to_string())
        );
        assert_eq!(
            extract_error_message(br#"{"message":"flat"}"#),
            Some("flat".to_string())
        );
        assert_eq!(
            extract_error_message(br#"{"error":"plain string"}"#),
            Some(r#"{"error":"plain string"}"#.to_string())
        );
        assert_eq!(
            extract_error_message(b"Service Unavailable"),
            Some("Service Unavailable".to_string())
        );
        assert_eq!(extract_error_message(b"  "), None);
    }

    #[test]
    fn empty_nested_message_falls_back_to_flat_message() {
        assert_eq!(
            extract_error_message(br#"{"error":{"message":""},"message":"flat"}"#),
            Some("flat".to_string())
        );
        assert_eq!(
            extract_error_message(br#"{"error":{"message":"  "},"message":""}"#),
            Some(r#"{"error":{"message":"  "},"message":""}"#.to_string())
        );
    }

    #[test]
    fn raw_body_is_surfaced_whole() {
        let page = format!("<html>{}</html>", "x".repeat(2000));
        assert_eq!(extract_error_message(page.as_bytes()), Some(page.clone()));
    }
}
