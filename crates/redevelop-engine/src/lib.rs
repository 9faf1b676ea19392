pub mod config;
pub mod generation;
pub mod prompt;
pub mod upload;

use anyhow::{Context, Result};
use rand::Rng;
use redevelop_contracts::events::{EventKind, EventWriter, RequestEvents};
use redevelop_contracts::requests::{AttemptRecord, GenerationRequest, GenerationResult};
use reqwest::blocking::Client as HttpClient;
use serde_json::json;

pub use config::EngineConfig;
pub use generation::{
    run_fallback_chain, BackendResponse, GenerationQuery, HttpImageBackend, ImageBackend,
    OVERLOADED_MESSAGE,
};
pub use prompt::build_prompt;
pub use upload::{derive_download_url, ReferenceHost, TmpfilesHost};

/// Result of one `Visualizer::generate` call together with its attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub request_id: String,
    pub result: GenerationResult,
    pub attempts: Vec<AttemptRecord>,
}

/// The visualization requester: prompt, optional reference upload, model
/// fallback chain.
pub struct Visualizer {
    config: EngineConfig,
    host: Box<dyn ReferenceHost>,
    backend: Box<dyn ImageBackend>,
    events: Option<EventWriter>,
}

impl Visualizer {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let host = TmpfilesHost::new(
            config.upload_endpoint.clone(),
            config.upload_host()?,
            http.clone(),
        );
        let backend = HttpImageBackend::new(http);
        Ok(Self::with_parts(config, Box::new(host), Box::new(backend)))
    }

    pub fn with_parts(
        config: EngineConfig,
        host: Box<dyn ReferenceHost>,
        backend: Box<dyn ImageBackend>,
    ) -> Self {
        Self {
            config,
            host,
            backend,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one generation. User-facing failures are reported in
    /// `GenerationReport::result`; `Err` is reserved for event-log I/O.
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationReport> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let events = match self.events.as_ref() {
            Some(writer) => writer.for_request(request_id),
            None => RequestEvents::detached(request_id),
        };
        let seed = request.seed.unwrap_or_else(draw_seed);
        let prompt = build_prompt(
            request.has_reference(),
            request.mode,
            &request.style,
            &request.building_type,
        );

        events.emit(
            EventKind::GenerationStarted,
            json!({
                "style": request.style.id,
                "building_type": request.building_type.id,
                "mode": request.mode.as_str(),
                "has_reference": request.has_reference(),
                "seed": seed,
                "models": self.config.models,
            }),
        )?;

        let reference_url = self.upload_reference(request, &events)?;

        let query = GenerationQuery {
            base: self.config.generation_base.clone(),
            prompt: prompt.clone(),
            width: self.config.width,
            height: self.config.height,
            seed,
            api_key: request.api_key.clone(),
            reference_url: reference_url.clone(),
        };

        let outcome = run_fallback_chain(
            self.backend.as_ref(),
            &query,
            &self.config.models,
            |index, record| {
                events.emit(
                    EventKind::ModelAttempt,
                    json!({
                        "backend": self.backend.name(),
                        "model": record.model,
                        "index": index,
                        "status_code": record.status_code,
                        "outcome": record.outcome.as_str(),
                        "error": record.message,
                    }),
                )
                .map(|_| ())
            },
        )?;

        let result = match outcome.result {
            Ok(success) => {
                events.emit(
                    EventKind::GenerationSucceeded,
                    json!({
                        "model": success.model,
                        "bytes": success.image.bytes.len(),
                        "content_type": success.image.content_type,
                    }),
                )?;
                GenerationResult::Success {
                    image: success.image,
                    prompt,
                    model: success.model,
                    seed,
                    reference_url,
                }
            }
            Err(message) => {
                events.emit(
                    EventKind::GenerationFailed,
                    json!({
                        "error": message,
                        "attempts": outcome.attempts.len(),
                    }),
                )?;
                GenerationResult::Failure { message }
            }
        };

        Ok(GenerationReport {
            request_id: events.request_id().to_string(),
            result,
            attempts: outcome.attempts,
        })
    }

    /// Best effort: any upload failure yields `None` and the generation
    /// continues without a reference image.
    fn upload_reference(
        &self,
        request: &GenerationRequest,
        events: &RequestEvents,
    ) -> Result<Option<String>> {
        let Some(image) = request.reference_image.as_ref() else {
            events.emit(EventKind::ReferenceUpload, json!({ "status": "skipped" }))?;
            return Ok(None);
        };

        match self.host.upload(image) {
            Ok(url) => {
                events.emit(
                    EventKind::ReferenceUpload,
                    json!({
                        "status": "uploaded",
                        "host": self.host.name(),
                        "url": url,
                        "bytes": image.bytes.len(),
                    }),
                )?;
                Ok(Some(url))
            }
            Err(err) => {
                events.emit(
                    EventKind::ReferenceUpload,
                    json!({
                        "status": "failed",
                        "host": self.host.name(),
                        "error": error_chain_text(&err, 1024),
                    }),
                )?;
                Ok(None)
            }
        }
    }
}

/// Uniform over the non-negative signed 32-bit range.
pub fn draw_seed() -> i64 {
    rand::thread_rng().gen_range(0..i32::MAX) as i64
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use redevelop_contracts::catalog::{Catalog, TransformMode};
    use redevelop_contracts::events::{read_events, EventWriter};
    use redevelop_contracts::requests::{
        AttemptOutcome, GenerationRequest, GenerationResult, ReferenceImage,
    };
    use serde_json::Value;

    use super::{
        draw_seed, error_chain_text, truncate_text, BackendResponse, EngineConfig, ImageBackend,
        ReferenceHost, Visualizer, OVERLOADED_MESSAGE,
    };

    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<String>>>);

    impl Calls {
        fn push(&self, value: String) {
            self.0.lock().unwrap().push(value);
        }

        fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakeHost {
        reply: Option<String>,
        calls: Calls,
    }

    impl ReferenceHost for FakeHost {
        fn name(&self) -> &str {
            "fake-host"
        }

        fn upload(&self, image: &ReferenceImage) -> Result<String> {
            self.calls.push(image.file_name.clone());
            match &self.reply {
                Some(url) => Ok(url.clone()),
                None => bail!("upload host unreachable"),
            }
        }
    }

    struct FakeBackend {
        script: Mutex<VecDeque<BackendResponse>>,
        calls: Calls,
    }

    impl ImageBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake-backend"
        }

        fn fetch(&self, url: &str) -> Result<BackendResponse> {
            self.calls.push(url.to_string());
            match self.script.lock().unwrap().pop_front() {
                Some(response) => Ok(response),
                None => bail!("script exhausted"),
            }
        }
    }

    fn reply(status: u16, body: &[u8]) -> BackendResponse {
        let content_type = if status == 200 { "image/png" } else { "text/plain" };
        BackendResponse {
            status,
            content_type: Some(content_type.to_string()),
            body: body.to_vec(),
        }
    }

    fn visualizer(
        upload_reply: Option<&str>,
        script: Vec<BackendResponse>,
    ) -> (Visualizer, Calls, Calls) {
        let host_calls = Calls::default();
        let backend_calls = Calls::default();
        let visualizer = Visualizer::with_parts(
            EngineConfig::default(),
            Box::new(FakeHost {
                reply: upload_reply.map(str::to_string),
                calls: host_calls.clone(),
            }),
            Box::new(FakeBackend {
                script: Mutex::new(script.into()),
                calls: backend_calls.clone(),
            }),
        );
        (visualizer, host_calls, backend_calls)
    }

    fn request(mode: TransformMode) -> GenerationRequest {
        let catalog = Catalog::new();
        GenerationRequest::new(
            catalog.style("duurzaam-groen").unwrap(),
            catalog.building_type("factory").unwrap(),
            mode,
            "sk_test",
        )
    }

    #[test]
    fn success_records_prompt_model_and_reference() -> Result<()> {
        let (visualizer, host_calls, backend_calls) = visualizer(
            Some("https://tmpfiles.org/dl/5/pand.jpg"),
            vec![reply(503, b""), reply(200, b"png-bytes")],
        );
        let request = request(TransformMode::Renovation)
            .with_reference_image(ReferenceImage::new("pand.jpg", vec![1, 2, 3]))
            .with_seed(99);

        let report = visualizer.generate(&request)?;

        assert_eq!(host_calls.all(), vec!["pand.jpg".to_string()]);
        let urls = backend_calls.all();
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|url| url.contains("&seed=99&")));
        assert!(urls[1].ends_with("&image=https%3A%2F%2Ftmpfiles.org%2Fdl%2F5%2Fpand.jpg"));
        match report.result {
            GenerationResult::Success {
                image,
                prompt,
                model,
                seed,
                reference_url,
            } => {
                assert_eq!(image.bytes, b"png-bytes".to_vec());
                assert_eq!(model, "nanobanana");
                assert_eq!(seed, 99);
                assert!(prompt.contains("Edit this photo of a factory industrial building"));
                assert_eq!(
                    reference_url.as_deref(),
                    Some("https://tmpfiles.org/dl/5/pand.jpg")
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::Retryable);
        Ok(())
    }

    #[test]
    fn failed_upload_still_generates_without_image_param() -> Result<()> {
        let (visualizer, host_calls, backend_calls) =
            visualizer(None, vec![reply(200, b"img")]);
        let request = request(TransformMode::FullRedevelopment)
            .with_reference_image(ReferenceImage::new("pand.png", vec![9]));

        let report = visualizer.generate(&request)?;

        assert_eq!(host_calls.all().len(), 1);
        let urls = backend_calls.all();
        assert_eq!(urls.len(), 1);
        assert!(!urls[0].contains("image="), "{}", urls[0]);
        match report.result {
            GenerationResult::Success {
                prompt,
                reference_url,
                ..
            } => {
                assert!(reference_url.is_none());
                // The edit template still applies: a photo was supplied.
                assert!(prompt.contains("replace the factory industrial building"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn no_reference_skips_upload() -> Result<()> {
        let (visualizer, host_calls, _) = visualizer(Some("unused"), vec![reply(200, b"img")]);
        let report = visualizer.generate(&request(TransformMode::Renovation))?;
        assert!(host_calls.all().is_empty());
        assert!(report.result.is_success());
        Ok(())
    }

    #[test]
    fn overloaded_chain_surfaces_generic_message() -> Result<()> {
        let (visualizer, _, backend_calls) = visualizer(
            None,
            vec![reply(429, b""), reply(429, b""), reply(429, b"")],
        );
        let report = visualizer.generate(&request(TransformMode::Renovation))?;
        assert_eq!(backend_calls.all().len(), 3);
        assert_eq!(report.result.error_message(), Some(OVERLOADED_MESSAGE));
        Ok(())
    }

    #[test]
    fn events_trace_the_whole_request() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let (visualizer, _, _) = visualizer(None, vec![reply(500, b"boom"), reply(400, b"bad")]);
        let visualizer = visualizer.with_events(EventWriter::new(&events_path, "session-1"));
        let request = request(TransformMode::Renovation)
            .with_reference_image(ReferenceImage::new("pand.jpg", vec![1]));

        let report = visualizer.generate(&request)?;
        assert_eq!(report.result.error_message(), Some("bad"));

        let events = read_events(&events_path);
        let types: Vec<&str> = events
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str))
            .collect();
        assert_eq!(
            types,
            vec![
                "generation_started",
                "reference_upload",
                "model_attempt",
                "model_attempt",
                "generation_failed"
            ]
        );
        assert_eq!(events[1]["status"], "failed");
        assert_eq!(events[2]["outcome"], "retryable");
        assert_eq!(events[3]["outcome"], "fatal");
        assert!(events
            .iter()
            .all(|row| row["request_id"] == Value::String(report.request_id.clone())));
        assert!(!std::fs::read_to_string(&events_path)?.contains("sk_test"));
        Ok(())
    }

    #[test]
    fn drawn_seeds_are_non_negative_i32() {
        for _ in 0..1000 {
            let seed = draw_seed();
            assert!((0..i32::MAX as i64).contains(&seed));
        }
    }

    #[test]
    fn error_chain_joins_distinct_causes() {
        let err = anyhow::anyhow!("connection refused").context("reference upload failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "reference upload failed | caused by: connection refused"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
