use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{BuildingTypeOption, StyleOption, TransformMode};

/// Photo of the existing building, kept as the raw uploaded bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ReferenceImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct GenerationRequest {
    pub reference_image: Option<ReferenceImage>,
    pub style: StyleOption,
    pub building_type: BuildingTypeOption,
    pub mode: TransformMode,
    pub api_key: String,
    /// Pinned seed; `None` draws a fresh one per request.
    pub seed: Option<i64>,
}

impl GenerationRequest {
    pub fn new(
        style: StyleOption,
        building_type: BuildingTypeOption,
        mode: TransformMode,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            reference_image: None,
            style,
            building_type,
            mode,
            api_key: api_key.into(),
            seed: None,
        }
    }

    pub fn with_reference_image(mut self, image: ReferenceImage) -> Self {
        self.reference_image = Some(image);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn has_reference(&self) -> bool {
        self.reference_image.is_some()
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            style: self.style.id.clone(),
            building_type: self.building_type.id.clone(),
            mode: self.mode,
            has_reference: self.has_reference(),
            seed: self.seed,
        }
    }
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("reference_image", &self.reference_image)
            .field("style", &self.style.id)
            .field("building_type", &self.building_type.id)
            .field("mode", &self.mode)
            .field("api_key", &"<redacted>")
            .field("seed", &self.seed)
            .finish()
    }
}

/// Serializable view of a request, free of image bytes and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub style: String,
    pub building_type: String,
    pub mode: TransformMode,
    pub has_reference: bool,
    pub seed: Option<i64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Success {
        image: GeneratedImage,
        prompt: String,
        model: String,
        seed: i64,
        reference_url: Option<String>,
    },
    Failure {
        message: String,
    },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GenerationResult::Failure { message } => Some(message.as_str()),
            GenerationResult::Success { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// 429 or 5xx: the next model in the chain is tried.
    Retryable,
    Fatal,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Retryable => "retryable",
            AttemptOutcome::Fatal => "fatal",
        }
    }
}

/// One model attempt of the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub model: String,
    pub status_code: Option<u16>,
    pub outcome: AttemptOutcome,
    pub message: Option<String>,
}
